//! Per-connection timing checks and the split of retransmission counts into buckets.
use super::containers::{BackoffCheck, Bucket, BucketKind, Connection, ConnectionReport, ConnectionTable};

/// Expected elapsed time (seconds since the SYN) of the n-th SYN/ACK.
///
/// Roughly 2^n with some slack, as observed from Linux listeners.
pub const BACKOFF_WINDOWS: [(f64, f64); 6] = [
    (0.0, 1.125),
    (1.0, 2.27),
    (3.0, 4.5),
    (7.0, 9.0),
    (15.0, 17.0),
    (31.0, 33.0),
];

/// SYN/ACKs received when the server exhausts all five retransmissions.
pub const MAX_SYN_ACKS: usize = 6;

/// Default split between the isolated backlog probe and the scan burst, in seconds.
pub const DEFAULT_TIME_THRESHOLD: f64 = 1.5;

/// Retransmission counts split by scan phase, plus the running totals.
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregate {
    pub original: Bucket,
    pub scan: Bucket,
    pub report: Vec<ConnectionReport>,
    pub syns_sent: usize,
    pub syn_acks_received: usize,
    /// Connections that received exactly [MAX_SYN_ACKS] SYN/ACKs.
    pub full_backlog: usize,
}

fn in_backoff_window(offset: f64) -> bool {
    BACKOFF_WINDOWS
        .iter()
        .any(|&(lower, upper)| offset >= lower && offset <= upper)
}

/// Checks if the SYN/ACKs of a connection arrive according to [BACKOFF_WINDOWS].
///
/// An offset only has to land in *some* window, not the one matching its position.
/// Connections failing the check are still aggregated, this is diagnostic only.
pub fn check_backoff(connection: &Connection) -> BackoffCheck {
    let mut matches = true;
    let offsets: Vec<f64> = connection
        .syn_acks
        .iter()
        .map(|syn_ack| syn_ack.timestamp - connection.syn.timestamp)
        .collect();

    for offset in &offsets {
        if !in_backoff_window(*offset) {
            log::debug!("SYN/ACK for ISN {} arrived off schedule at +{offset:.4}s", connection.isn());
            matches = false;
        }
    }

    BackoffCheck { matches, offsets }
}

/// Orders connections by SYN timestamp. Ties keep table order.
pub fn sorted_connections(table: &ConnectionTable) -> Vec<&Connection> {
    let mut connections: Vec<&Connection> = table.iter().collect();
    connections.sort_by(|a, b| a.syn.timestamp.total_cmp(&b.syn.timestamp));
    connections
}

/// Buckets every connection's SYN/ACK count by how long after the first SYN it was sent.
///
/// SYNs sent later than `time_threshold` seconds after the earliest SYN go to the
/// original bucket, everything else to the scan bucket.
pub fn aggregate(table: &ConnectionTable, time_threshold: f64) -> Aggregate {
    log::info!("Aggregating {} connections.", table.len());
    let mut aggregate = Aggregate {
        original: Bucket::new(BucketKind::Original),
        scan: Bucket::new(BucketKind::Scan),
        report: Vec::with_capacity(table.len()),
        syns_sent: 0,
        syn_acks_received: 0,
        full_backlog: 0,
    };

    if table.is_empty() {
        return aggregate;
    }

    let connections = sorted_connections(table);
    let start_time = connections[0].syn.timestamp;

    for (index, connection) in connections.iter().enumerate() {
        let count = connection.retransmissions();
        let timestamp = connection.syn.timestamp;

        if timestamp > start_time + time_threshold {
            aggregate.original.push(count);
        } else {
            aggregate.scan.push(count);
        }

        aggregate.report.push(ConnectionReport {
            index: index + 1,
            timestamp,
            count,
        });

        aggregate.syns_sent += 1;
        aggregate.syn_acks_received += count;
        if count == MAX_SYN_ACKS {
            aggregate.full_backlog += 1;
        }
    }

    aggregate
}
