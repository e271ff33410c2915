/// A packet inside an OGG stream.
///
/// When reading, the data borrows the buffer of the [`StreamReader`](crate::StreamReader)
/// it came from. When writing, it borrows whatever the caller wants to submit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Packet<'a> {
    /// The data of the packet.
    pub data: &'a [u8],
    /// The packet is the first one of its logical bitstream.
    pub bos: bool,
    /// The packet is the last one of its logical bitstream.
    pub eos: bool,
    /// The granular position after the last sample (`granule`) of the packet.
    ///
    /// `-1` if unset. When reading, only the last packet completed on a page carries the
    /// granule position of that page.
    pub granule_position: i64,
    /// The sequential number of the packet.
    pub packet_number: i64,
}

impl<'a> Packet<'a> {
    /// Creates a packet in the middle of a stream.
    pub fn new(data: &'a [u8], granule_position: i64) -> Self {
        Self {
            data,
            bos: false,
            eos: false,
            granule_position,
            packet_number: 0,
        }
    }

    /// Marks the packet as the last one of its logical bitstream.
    pub fn with_eos(mut self) -> Self {
        self.eos = true;
        self
    }
}

/// An owned packet, filled by the [`Demuxer`](crate::Demuxer).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PacketBuf {
    /// The data of the packet.
    pub data: Vec<u8>,
    /// The serial number of the logical bitstream the packet belongs to.
    pub serial: u32,
    /// The packet is the first one of its logical bitstream.
    pub bos: bool,
    /// The packet is the last one of its logical bitstream.
    pub eos: bool,
    /// The granular position after the last sample (`granule`) of the packet. `-1` if unset.
    pub granule_position: i64,
    /// The sequential number of the packet.
    pub packet_number: i64,
}

impl PacketBuf {
    /// Copies the given packet into this buffer, reusing its allocation.
    pub fn copy_from(&mut self, serial: u32, packet: &Packet<'_>) {
        self.data.clear();
        self.data.extend_from_slice(packet.data);
        self.serial = serial;
        self.bos = packet.bos;
        self.eos = packet.eos;
        self.granule_position = packet.granule_position;
        self.packet_number = packet.packet_number;
    }

    /// Borrows the buffer as a packet.
    pub fn as_packet(&self) -> Packet<'_> {
        Packet {
            data: &self.data,
            bos: self.bos,
            eos: self.eos,
            granule_position: self.granule_position,
            packet_number: self.packet_number,
        }
    }
}
