//! Packet-capture detection: classic libpcap file header.

use super::{Fields, Probe, Recorder};
use crate::errors::ScanError;
use crate::meta::Item;
use std::io::Read;

pub const FORMAT: &str = "{filename_relative}[{line}]: pcap v{version} ({linktype})";

const MAGIC: u32 = 0xa1b2_c3d4;
const HEADER_SIZE: usize = 24;

// DLT code -> link layer name
const LINKTYPES: &[(u32, &str)] = &[
    (0, "NULL"),
    (1, "Ethernet"),
    (3, "AX25"),
    (6, "IEEE802.5"),
    (7, "ARCNet BSD"),
    (8, "SLIP"),
    (9, "PPP"),
    (10, "FDDI"),
    (50, "PPP HDLC"),
    (51, "PPP ETHER"),
    (100, "ATM RFC1483"),
    (101, "RAW"),
    (104, "C_HDLC"),
    (105, "IEEE802.11"),
    (107, "FRELAY"),
    (108, "LOOP"),
    (113, "LINUX SLL"),
    (114, "LTALK"),
    (117, "PFLOG"),
    (119, "IEEE802.11 PRISM"),
    (122, "IP over FC"),
    (123, "SUNATM"),
    (127, "IEEE802.11 RADIOTAP"),
    (129, "ARCNET Linux"),
    (138, "Apple IP over IEEE1394"),
    (139, "MTP2 with PHDR"),
    (140, "MTP2"),
    (141, "MTP3"),
    (142, "SCCP"),
    (143, "DOCSIS"),
    (144, "Linux IRDA"),
    (163, "IEEE802.11 AVS"),
    (165, "BACNET MS TP"),
    (166, "PPP PPPD"),
    (169, "GPRS LLC"),
    (177, "Linux LAPD"),
    (187, "Bluetooth HCI H4"),
    (189, "USB Linux"),
    (192, "PPI"),
    (195, "IEEE802.15-4"),
    (196, "SITA"),
    (197, "ERF"),
    (201, "Bluetooth HCI H4 with PHDR"),
    (202, "AX25 KISS"),
    (203, "LAPD"),
    (204, "PPP with DIR"),
    (205, "C_HDLC with DIR"),
    (206, "FRELAY with DIR"),
    (209, "IPMB Linux"),
    (215, "IEEE802.15-4 NONASK PHY"),
    (220, "USB Linux mmapped"),
    (224, "FC 2"),
    (225, "FC 2 with frame delims"),
    (226, "IPNET"),
    (227, "CAN SOCKETCAN"),
    (228, "IPv4"),
    (229, "IPv6"),
    (230, "IEEE802.15-4 NOFCS"),
    (231, "DBUS"),
    (235, "DVB CI"),
    (236, "MUX27010"),
    (237, "STANAG 5066-D PDU"),
    (239, "NFLOG"),
    (240, "Netanalyzer"),
    (241, "Netanalyzer Transparent"),
    (242, "IPOIB"),
    (243, "MPEG-2 TS"),
    (244, "NG40"),
    (245, "NFC LLCP"),
    (247, "Infiniband"),
    (248, "SCTP"),
];

fn linktype_name(code: u32) -> &'static str {
    LINKTYPES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or("Unknown")
}

pub struct Pcap;

impl Pcap {
    pub fn new() -> Self {
        Pcap
    }
}

impl Default for Pcap {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for Pcap {
    fn probe(&mut self, item: &Item, rec: &mut Recorder) -> Result<(), ScanError> {
        let mut reader = item.open()?;
        let mut header = [0u8; HEADER_SIZE];
        let mut filled = 0;
        while filled < HEADER_SIZE {
            match reader.read(&mut header[filled..])? {
                0 => return Ok(()), // shorter than a pcap header
                n => filled += n,
            }
        }
        let dword = |at: usize| u32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]]);
        if dword(0) != MAGIC {
            return Ok(());
        }
        let version_major = u16::from_le_bytes([header[4], header[5]]);
        let version_minor = u16::from_le_bytes([header[6], header[7]]);
        let network = dword(20);
        let mut fields = Fields::new();
        fields.insert("line".to_string(), "1".to_string());
        fields.insert(
            "version".to_string(),
            format!("{}.{}", version_major, version_minor),
        );
        fields.insert("version_major".to_string(), version_major.to_string());
        fields.insert("version_minor".to_string(), version_minor.to_string());
        fields.insert("linktype".to_string(), linktype_name(network).to_string());
        rec.record(item, fields)
    }
}
