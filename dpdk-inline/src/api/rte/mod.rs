pub mod cpuset;
pub mod cycles;
pub mod eal;
pub mod eth;
pub mod lcore;
pub mod mbuf;
pub mod pktmbuf;
pub mod queue;
pub mod spinlock;
