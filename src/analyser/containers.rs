use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// TCP flags of a bare SYN.
pub const SYN: u16 = 0x002;
/// TCP flags of a SYN/ACK.
pub const SYNACK: u16 = 0x012;

/// The relevant TCP fields of one captured packet.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PacketRecord {
    pub timestamp: f64,
    pub flags: u16,
    pub sequence_number: u32,
    pub ack_number: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketKind {
    Syn,
    SynAck,
    Other,
}

impl PacketRecord {
    pub fn new(timestamp: f64, flags: u16, sequence_number: u32, ack_number: u32) -> Self {
        Self {
            timestamp,
            flags,
            sequence_number,
            ack_number,
        }
    }

    /// Flags must match exactly, a SYN carrying ECE/CWR is not a probe.
    pub fn kind(&self) -> PacketKind {
        match self.flags {
            SYN => PacketKind::Syn,
            SYNACK => PacketKind::SynAck,
            _ => PacketKind::Other,
        }
    }
}

/// One handshake attempt: the SYN we sent and every SYN/ACK it provoked, in arrival order.
#[derive(Clone, Debug, Serialize)]
pub struct Connection {
    pub syn: PacketRecord,
    pub syn_acks: Vec<PacketRecord>,
}

impl Connection {
    pub fn new(syn: PacketRecord) -> Self {
        Self {
            syn,
            syn_acks: Vec::new(),
        }
    }

    pub fn isn(&self) -> u32 {
        self.syn.sequence_number
    }

    pub fn add_syn_ack(&mut self, syn_ack: PacketRecord) {
        self.syn_acks.push(syn_ack);
    }

    pub fn retransmissions(&self) -> usize {
        self.syn_acks.len()
    }
}

/// Maps ISNs to connections.
///
/// Keeps insertion order. A SYN reusing an ISN replaces the earlier connection
/// (and its SYN/ACKs) but keeps the slot it was first inserted at.
#[derive(Clone, Debug, Default)]
pub struct ConnectionTable {
    connections: Vec<Connection>,
    slots: HashMap<u32, usize>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, connection: Connection) {
        match self.slots.get(&connection.isn()) {
            Some(&slot) => {
                log::debug!("ISN {} seen twice, dropping earlier connection", connection.isn());
                self.connections[slot] = connection;
            }
            None => {
                self.slots.insert(connection.isn(), self.connections.len());
                self.connections.push(connection);
            }
        }
    }

    pub fn get(&self, isn: u32) -> Option<&Connection> {
        self.slots.get(&isn).map(|&slot| &self.connections[slot])
    }

    pub fn get_mut(&mut self, isn: u32) -> Option<&mut Connection> {
        match self.slots.get(&isn) {
            Some(&slot) => self.connections.get_mut(slot),
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BucketKind {
    Original,
    Scan,
}

/// Retransmission counts of the connections that fell into one time window.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Bucket {
    pub kind: BucketKind,
    pub counts: Vec<usize>,
}

impl Bucket {
    pub fn new(kind: BucketKind) -> Self {
        Self {
            kind,
            counts: Vec::new(),
        }
    }

    pub fn with_counts(kind: BucketKind, counts: Vec<usize>) -> Self {
        Self { kind, counts }
    }

    pub fn push(&mut self, count: usize) {
        self.counts.push(count);
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn contains(&self, count: usize) -> bool {
        self.counts.contains(&count)
    }

    /// Arithmetic mean, 0 for an empty bucket.
    pub fn mean(&self) -> f64 {
        if self.counts.is_empty() {
            return 0.0;
        }
        self.counts.iter().sum::<usize>() as f64 / self.counts.len() as f64
    }

    pub fn max(&self) -> Option<usize> {
        self.counts.iter().copied().max()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Verdict {
    /// Host never answered during the scan window.
    #[serde(rename = "ERR")]
    Err,
    #[serde(rename = "SYN")]
    Syn,
    #[serde(rename = "!SYN")]
    NotSyn,
    #[serde(rename = "RST")]
    Rst,
    #[serde(rename = "!RST")]
    NotRst,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            Verdict::Err => "ERR",
            Verdict::Syn => "SYN",
            Verdict::NotSyn => "!SYN",
            Verdict::Rst => "RST",
            Verdict::NotRst => "!RST",
        };
        write!(f, "{label}")
    }
}

/// Outcome of comparing a connection's SYN/ACK timing with the backoff schedule.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BackoffCheck {
    pub matches: bool,
    pub offsets: Vec<f64>,
}

/// One row of the per-connection report, `index` is 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ConnectionReport {
    pub index: usize,
    pub timestamp: f64,
    pub count: usize,
}

/// A connection whose SYN/ACKs did not follow the expected backoff.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BackoffAnomaly {
    pub index: usize,
    pub timestamp: f64,
    pub offsets: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syn(ts: f64, seq: u32) -> PacketRecord {
        PacketRecord::new(ts, SYN, seq, 0)
    }

    #[test]
    fn packet_kind_requires_exact_flags() {
        assert_eq!(syn(0.0, 1).kind(), PacketKind::Syn);
        assert_eq!(PacketRecord::new(0.0, SYNACK, 1, 2).kind(), PacketKind::SynAck);
        // SYN with ECE and CWR set
        assert_eq!(PacketRecord::new(0.0, 0xc2, 1, 0).kind(), PacketKind::Other);
        // RST
        assert_eq!(PacketRecord::new(0.0, 0x04, 1, 0).kind(), PacketKind::Other);
    }

    #[test]
    fn table_overwrite_keeps_first_slot() {
        let mut table = ConnectionTable::new();
        let mut first = Connection::new(syn(0.0, 7));
        first.add_syn_ack(PacketRecord::new(0.5, SYNACK, 100, 8));
        table.insert(first);
        table.insert(Connection::new(syn(1.0, 9)));
        table.insert(Connection::new(syn(2.0, 7)));

        assert_eq!(table.len(), 2);
        let order: Vec<u32> = table.iter().map(|c| c.isn()).collect();
        assert_eq!(order, vec![7, 9]);

        let replaced = table.get(7).unwrap();
        assert_eq!(replaced.syn.timestamp, 2.0);
        assert_eq!(replaced.retransmissions(), 0);
    }

    #[test]
    fn bucket_mean_and_max() {
        let empty = Bucket::new(BucketKind::Scan);
        assert_eq!(empty.mean(), 0.0);
        assert_eq!(empty.max(), None);

        let bucket = Bucket::with_counts(BucketKind::Original, vec![1, 2, 6]);
        assert_eq!(bucket.mean(), 3.0);
        assert_eq!(bucket.max(), Some(6));
        assert!(bucket.contains(6));
        assert!(!bucket.contains(3));
    }

    #[test]
    fn verdict_labels() {
        let labels: Vec<String> = [Verdict::Err, Verdict::Syn, Verdict::NotSyn, Verdict::Rst, Verdict::NotRst]
            .iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(labels, vec!["ERR", "SYN", "!SYN", "RST", "!RST"]);
    }
}
