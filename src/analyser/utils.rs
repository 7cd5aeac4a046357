//! Contains utilities and helper functions that turn tshark output into [PacketRecord]s.
use rtshark::{Packet, RTShark};
use std::io;
use std::path::Path;
use super::containers::PacketRecord;

/// Only SYNs and SYN/ACKs matter to us.
pub const DISPLAY_FILTER: &str = "tcp.flags.syn == 1";

/// Parses a `tcp.flags` value as rendered by tshark (`0x0012`), or a plain decimal.
pub fn parse_flags(value: &str) -> Option<u16> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => value.parse::<u16>().ok(),
    }
}

fn metadata<'a>(packet: &'a Packet, layer: &str, name: &str) -> Option<&'a str> {
    packet
        .layer_name(layer)
        .and_then(|layer| layer.metadata(name))
        .map(|metadata| metadata.value())
}

/// Seconds since the first frame of the capture.
///
/// Falls back to the absolute capture time if tshark did not dissect `frame.time_relative`.
fn timestamp(packet: &Packet) -> Option<f64> {
    if let Some(relative) = metadata(packet, "frame", "frame.time_relative").and_then(|v| v.parse::<f64>().ok()) {
        return Some(relative);
    }
    packet.timestamp_micros().map(|micros| micros as f64 / 1_000_000.0)
}

/// Extracts the fields the analysis needs from a tshark packet.
///
/// Uses the raw sequence and acknowledgement numbers, tshark's relative numbers
/// would make every ISN zero.
pub fn packet_record(packet: &Packet) -> Option<PacketRecord> {
    let flags = parse_flags(metadata(packet, "tcp", "tcp.flags")?)?;
    let sequence_number = metadata(packet, "tcp", "tcp.seq_raw")?.parse::<u32>().ok()?;
    let ack_number = metadata(packet, "tcp", "tcp.ack_raw")
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);

    Some(PacketRecord::new(timestamp(packet)?, flags, sequence_number, ack_number))
}

/// Pulls packets from `read` until it runs dry and converts them with `convert`.
///
/// A read error aborts the whole collection, a partial capture is never analysed.
/// Packets `convert` can't make sense of are skipped.
pub fn drain_records<T, R, C>(mut read: R, convert: C) -> io::Result<Vec<PacketRecord>>
where
    R: FnMut() -> io::Result<Option<T>>,
    C: Fn(&T) -> Option<PacketRecord>,
{
    let mut records = Vec::new();
    let mut skipped = 0;

    while let Some(packet) = read()? {
        match convert(&packet) {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} packets without usable TCP fields.");
    }

    Ok(records)
}

/// Drains tshark and converts every packet.
pub fn get_packet_records(rtshark: &mut RTShark) -> io::Result<Vec<PacketRecord>> {
    log::info!("Collecting SYN and SYN/ACK segments.");
    drain_records(|| rtshark.read(), packet_record).map_err(|e| {
        log::error!("Error parsing TShark output when collecting packets: {e}");
        e
    })
}

/// Loads PCAP/PCAPNG file via rtshark.
///
/// Display filter used: `tcp.flags.syn == 1`.
/// Calls get_packet_records() after loading packets.
pub fn load_file(filepath: &str) -> io::Result<Vec<PacketRecord>> {
    log::info!("Loading capture file.");

    let builder = rtshark::RTSharkBuilder::builder()
        .input_path(filepath)
        .display_filter(DISPLAY_FILTER);

    let mut rtshark = match builder.spawn() {
        Err(err) => {
            log::error!("Error spawning tshark: {err}");
            return Err(err);
        }
        Ok(rtshark) => {
            log::info!("Reading from {}", filepath);
            rtshark
        }
    };

    let records = get_packet_records(&mut rtshark);
    rtshark.kill();
    let records = records?;
    log::info!("Read {} packets.", records.len());

    Ok(records)
}

/// Scans with injected resets are recorded to files with `rst` in their name.
pub fn reset_hint_from_path(filepath: &str) -> bool {
    Path::new(filepath)
        .file_name()
        .map(|name| name.to_string_lossy().contains("rst"))
        .unwrap_or(false)
}
