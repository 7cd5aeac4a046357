use chrono::{DateTime, Utc};
use serde::Serialize;
use super::containers::{BackoffAnomaly, Bucket, Connection, ConnectionReport, ConnectionTable, PacketKind, PacketRecord, Verdict};
use super::scan::{self, DEFAULT_TIME_THRESHOLD};

/// Scan-bucket mean below which the host is considered to honour SYN backlog limits.
pub const SYN_MEAN_THRESHOLD: f64 = 3.5;
/// Retransmission count that has to appear in the scan bucket for a SYN verdict.
pub const SYN_SIGNATURE_COUNT: usize = 3;

/// Parameters of one analysis run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AnalysisOptions {
    /// Seconds after the first SYN that separate the backlog probe from the scan window.
    pub time_threshold: f64,
    /// The capture comes from a scan that injected RST segments.
    pub reset_hint: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            time_threshold: DEFAULT_TIME_THRESHOLD,
            reset_hint: false,
        }
    }
}

/// Everything we learned from one capture.
#[derive(Clone, Debug, Serialize)]
pub struct RetransmissionSession {
    pub analysed_at: DateTime<Utc>,
    pub options: AnalysisOptions,
    pub connections: Vec<ConnectionReport>,
    pub anomalies: Vec<BackoffAnomaly>,
    pub original: Bucket,
    pub scan: Bucket,
    pub syns_sent: usize,
    pub syn_acks_received: usize,
    pub full_backlog: usize,
    pub mean_scan_retransmissions: f64,
    pub verdict: Verdict,
}

/// Correlates SYNs and SYN/ACKs into connections keyed by ISN.
///
/// A SYN/ACK belongs to the SYN whose ISN equals its ack number minus one.
/// SYN/ACKs without a matching SYN are unsolicited and dropped.
pub fn track(packets: &[PacketRecord]) -> ConnectionTable {
    log::info!("Tracking connections in {} packets.", packets.len());
    let mut table = ConnectionTable::new();
    let mut unsolicited = 0;

    for packet in packets {
        match packet.kind() {
            PacketKind::Syn => table.insert(Connection::new(*packet)),
            PacketKind::SynAck => {
                let isn = packet.ack_number.wrapping_sub(1);
                match table.get_mut(isn) {
                    Some(connection) => connection.add_syn_ack(*packet),
                    None => unsolicited += 1,
                }
            }
            PacketKind::Other => continue,
        }
    }

    if unsolicited > 0 {
        log::warn!("Dropped {unsolicited} unsolicited SYN/ACKs.");
    }
    log::info!("Found {} connections.", table.len());

    table
}

/// Derives the verdict from the bucketed retransmission counts.
///
/// Returns the verdict together with the mean of the scan bucket (0 if empty).
pub fn classify(original: &Bucket, scan: &Bucket, reset_hint: bool) -> (Verdict, f64) {
    let mean = scan.mean();
    log::debug!("Original bucket {:?}, scan bucket {:?}, mean {mean:.3}", original.counts, scan.counts);

    let verdict = if mean == 0.0 {
        Verdict::Err
    } else if mean < SYN_MEAN_THRESHOLD && scan.contains(SYN_SIGNATURE_COUNT) {
        if reset_hint {
            Verdict::NotRst
        } else {
            Verdict::Syn
        }
    } else if reset_hint {
        Verdict::Rst
    } else {
        Verdict::NotSyn
    };

    (verdict, mean)
}

/// Runs the whole pipeline over the packets of one capture.
pub fn analyse(packets: &[PacketRecord], options: &AnalysisOptions) -> RetransmissionSession {
    log::info!("Starting analysis.");
    let table = track(packets);

    let anomalies: Vec<BackoffAnomaly> = scan::sorted_connections(&table)
        .into_iter()
        .enumerate()
        .filter_map(|(index, connection)| {
            let check = scan::check_backoff(connection);
            if check.matches {
                return None;
            }
            log::warn!("SYN segment #{} does not follow the expected backoff: {:?}", index + 1, check.offsets);
            Some(BackoffAnomaly {
                index: index + 1,
                timestamp: connection.syn.timestamp,
                offsets: check.offsets,
            })
        })
        .collect();

    let aggregate = scan::aggregate(&table, options.time_threshold);
    let (verdict, mean) = classify(&aggregate.original, &aggregate.scan, options.reset_hint);
    log::info!("Verdict: {verdict}");

    RetransmissionSession {
        analysed_at: Utc::now(),
        options: *options,
        connections: aggregate.report,
        anomalies,
        original: aggregate.original,
        scan: aggregate.scan,
        syns_sent: aggregate.syns_sent,
        syn_acks_received: aggregate.syn_acks_received,
        full_backlog: aggregate.full_backlog,
        mean_scan_retransmissions: mean,
        verdict,
    }
}
