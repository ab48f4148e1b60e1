//! Native MPI collectives on a single process (`cargo test --features mpi-support`).
#![cfg(feature = "mpi-support")]

use xfem_sieve::algs::communicator::{CommTag, Communicator, MpiComm};

#[test]
fn single_rank_collectives_return_own_buffer() {
    let comm = MpiComm::new().expect("MPI initialises once per process");
    let tag = CommTag::new(0x51);
    let me = comm.rank() as u8;
    let size = comm.size();

    let gathered = comm.all_gather(tag, &[me, 7], None).unwrap();
    assert_eq!(gathered.len(), size);
    assert_eq!(gathered[comm.rank()], vec![me, 7]);

    let rooted = comm.gather_to_root(tag, &[me; 3], None).unwrap();
    if comm.rank() == 0 {
        let rooted = rooted.expect("root receives every contribution");
        assert_eq!(rooted.len(), size);
        for (rank, buf) in rooted.iter().enumerate() {
            assert_eq!(buf, &vec![rank as u8; 3]);
        }
    } else {
        assert!(rooted.is_none());
    }

    let routed: Vec<Vec<u8>> = (0..size).map(|dst| vec![me, dst as u8]).collect();
    let got = comm.all_to_all(tag, &routed, None).unwrap();
    for (src, buf) in got.iter().enumerate() {
        assert_eq!(buf, &vec![src as u8, me]);
    }
}
