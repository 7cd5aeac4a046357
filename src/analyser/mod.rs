//! The core of SYN/ACK retransmission analysis.
//! Correlate SYNs with their SYN/ACKs and use retransmission counts and timing to infer backlog behaviour.
pub mod utils;
pub mod core;
pub mod scan;
pub mod containers;
pub mod ipid;
