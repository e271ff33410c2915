#![allow(dead_code)]

use std::convert::TryFrom;

use ogg_bitstream::crc32::crc32;
use ogg_bitstream::{Packet, PacketBuf, PacketStatus, StreamReader, StreamWriter, SyncState};

/// Location of the checksum inside a page header.
pub const CRC32_RANGE: std::ops::Range<usize> = 22..26;

/// Builds a page by hand. Every packet is terminated on the page.
pub fn build_page(
    header_type: u8,
    serial: u32,
    sequence: u32,
    granule_position: i64,
    packets: &[&[u8]],
) -> Vec<u8> {
    let mut lacing = Vec::new();
    let mut body = Vec::new();
    for packet in packets {
        lacing.extend(std::iter::repeat(255_u8).take(packet.len() / 255));
        lacing.push(u8::try_from(packet.len() % 255).unwrap());
        body.extend_from_slice(packet);
    }

    let mut page = b"OggS".to_vec();
    page.push(0);
    page.push(header_type);
    page.extend_from_slice(&granule_position.to_le_bytes());
    page.extend_from_slice(&serial.to_le_bytes());
    page.extend_from_slice(&sequence.to_le_bytes());
    page.extend_from_slice(&[0; 4]);
    page.push(u8::try_from(lacing.len()).unwrap());
    page.extend_from_slice(&lacing);
    page.extend_from_slice(&body);

    let crc = crc32(&page);
    page[CRC32_RANGE].copy_from_slice(&crc.to_le_bytes());
    page
}

/// Deterministic filler data.
pub fn pattern(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            state.to_be_bytes()[1]
        })
        .collect()
}

pub fn granule_of(index: usize) -> i64 {
    i64::try_from(index).unwrap() * 100
}

/// Laces the packets into pages. The last packet ends the stream.
pub fn encode(serial: u32, packets: &[Vec<u8>]) -> Vec<u8> {
    let mut writer = StreamWriter::new(serial);
    let mut out = Vec::new();

    for (index, data) in packets.iter().enumerate() {
        let mut packet = Packet::new(data, granule_of(index));
        if index + 1 == packets.len() {
            packet = packet.with_eos();
        }
        writer.packet_in(&packet).unwrap();
        for page in writer.drain_pages(false) {
            page.write_to(&mut out).unwrap();
        }
    }
    for page in writer.drain_pages(true) {
        page.write_to(&mut out).unwrap();
    }

    out
}

/// Feeds the data in chunks of the given size and collects all packets.
pub fn decode(serial: u32, data: &[u8], chunk_size: usize) -> Vec<PacketBuf> {
    let mut sync = SyncState::new();
    let mut stream = StreamReader::new(serial);
    let mut packets = Vec::new();

    for chunk in data.chunks(chunk_size) {
        sync.supply_bytes(chunk);
        for page in sync.drain_pages() {
            stream.page_in(&page.unwrap()).unwrap();
        }

        loop {
            match stream.packet_out() {
                PacketStatus::Packet(packet) => {
                    let mut buf = PacketBuf::default();
                    buf.copy_from(serial, &packet);
                    packets.push(buf);
                }
                PacketStatus::Corrupt => panic!("unexpected hole in bitstream {}", serial),
                PacketStatus::NeedMoreData => break,
            }
        }
    }

    packets
}
