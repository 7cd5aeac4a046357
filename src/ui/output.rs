use crate::analyser::core::RetransmissionSession;
use crate::analyser::containers::{Bucket, ConnectionReport, Verdict};
use ansi_term::Colour;
use std::fs;
use std::io;
use std::path::Path;

pub fn print_results(session: &RetransmissionSession) {
    for line in render_connections(&session.connections) {
        println!("{line}");
    }
    for line in render_summary(session) {
        println!("{line}");
    }
    println!("Verdict: {}", paint_verdict(session.verdict));
    print_anomalies(session);
}

/// One line per connection, in SYN timestamp order.
pub fn render_connections(reports: &[ConnectionReport]) -> Vec<String> {
    reports
        .iter()
        .map(|report| format!("[{:.4}] SYN segment #{} received {} SYN/ACKs.", report.timestamp, report.index, report.count))
        .collect()
}

/// Overall statistics, without the verdict.
pub fn render_summary(session: &RetransmissionSession) -> Vec<String> {
    let mut lines = vec![
        format!("Sent {} SYNs and received {} SYN/ACKs.", session.syns_sent, session.syn_acks_received),
        format!("On average, we received {:.3} SYN/ACKs for every SYN.", session.mean_scan_retransmissions),
        format!(
            "For {} SYNs, we received 6 SYN/ACKs, i.e., the maximum amount of 5 retransmissions.",
            session.full_backlog
        ),
    ];

    if let Some(line) = render_original_backlog(&session.original) {
        lines.push(line);
    }

    lines
}

/// Omitted if the backlog probe never happened.
pub fn render_original_backlog(original: &Bucket) -> Option<String> {
    if original.is_empty() {
        return None;
    }
    let max = original.max().unwrap_or(0);
    let counts: Vec<String> = original.counts.iter().map(|count| count.to_string()).collect();
    Some(format!("Max. SYN/ACKs for original backlog: {} ([{}])", max, counts.join(", ")))
}

fn paint_verdict(verdict: Verdict) -> String {
    let colour = match verdict {
        Verdict::Err => Colour::Red,
        Verdict::Syn | Verdict::NotRst => Colour::Green,
        Verdict::Rst | Verdict::NotSyn => Colour::Fixed(226),
    };
    colour.paint(verdict.to_string()).to_string()
}

fn print_anomalies(session: &RetransmissionSession) {
    if session.anomalies.is_empty() {
        return;
    }

    println!("\n\u{250F}\u{2501}\u{2501}\u{2501}\u{2501} Backoff anomalies");
    for anomaly in &session.anomalies {
        let offsets: Vec<String> = anomaly.offsets.iter().map(|offset| format!("{offset:.4}")).collect();
        println!(
            "\u{2503} SYN segment #{} [{:.4}] SYN/ACK offsets: {}",
            Colour::Red.paint(anomaly.index.to_string()),
            anomaly.timestamp,
            offsets.join(", ")
        );
    }
    println!("\u{2503}");
}

pub fn print_ipid_result(global: bool) {
    if global {
        println!("Given IPID sequence likely to be global.");
    } else {
        println!("Given IPID sequence probably *not* global.");
    }
}

pub fn data_as_json(session: &RetransmissionSession) -> serde_json::Result<String> {
    serde_json::to_string_pretty(session)
}

pub fn data_to_file(json: String, path: &Path) -> io::Result<()> {
    log::info!("Writing session to {}", path.display());
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::containers::{BucketKind, PacketRecord, SYN, SYNACK};
    use crate::analyser::core::{analyse, AnalysisOptions};

    #[test]
    fn connection_lines() {
        let reports = vec![
            ConnectionReport { index: 1, timestamp: 0.0, count: 0 },
            ConnectionReport { index: 2, timestamp: 1394012345.123456, count: 6 },
        ];
        assert_eq!(
            render_connections(&reports),
            vec![
                "[0.0000] SYN segment #1 received 0 SYN/ACKs.",
                "[1394012345.1235] SYN segment #2 received 6 SYN/ACKs.",
            ]
        );
    }

    #[test]
    fn original_backlog_line() {
        assert_eq!(render_original_backlog(&Bucket::new(BucketKind::Original)), None);
        let original = Bucket::with_counts(BucketKind::Original, vec![5, 6, 2]);
        assert_eq!(
            render_original_backlog(&original).unwrap(),
            "Max. SYN/ACKs for original backlog: 6 ([5, 6, 2])"
        );
    }

    #[test]
    fn summary_lines() {
        let packets = vec![
            PacketRecord::new(0.0, SYN, 10, 0),
            PacketRecord::new(0.5, SYNACK, 77, 11),
            PacketRecord::new(1.5, SYNACK, 77, 11),
            PacketRecord::new(2.0, SYN, 20, 0),
            PacketRecord::new(2.5, SYNACK, 78, 21),
        ];
        let session = analyse(&packets, &AnalysisOptions::default());

        assert_eq!(
            render_summary(&session),
            vec![
                "Sent 2 SYNs and received 3 SYN/ACKs.",
                "On average, we received 2.000 SYN/ACKs for every SYN.",
                "For 0 SYNs, we received 6 SYN/ACKs, i.e., the maximum amount of 5 retransmissions.",
                "Max. SYN/ACKs for original backlog: 1 ([1])",
            ]
        );
    }

    #[test]
    fn summary_without_original_bucket() {
        let session = analyse(&[PacketRecord::new(0.0, SYN, 1, 0)], &AnalysisOptions::default());
        let summary = render_summary(&session);
        assert_eq!(summary.len(), 3);
        assert!(summary.iter().all(|line| !line.contains("original backlog")));
    }

    #[test]
    fn json_carries_verdict_label() {
        let session = analyse(&[PacketRecord::new(0.0, SYN, 1, 0)], &AnalysisOptions::default());
        let json = data_as_json(&session).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["verdict"], "ERR");
        assert_eq!(value["connections"][0]["count"], 0);
        assert_eq!(value["options"]["time_threshold"], 1.5);
    }
}
