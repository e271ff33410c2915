use std::io::Write;

use log::debug;

use crate::{Packet, StreamWriter, StreamWriterConfig, WriteError};

/// Generic OGG stream writer. Multiplexes logical bitstreams into a writer.
#[derive(Clone, Debug)]
pub struct Muxer<W: Write> {
    writer: W,
    config: StreamWriterConfig,
    stream_states: Vec<StreamWriter>,
}

impl<W: Write> Muxer<W> {
    /// Creates a new `Muxer`.
    pub fn new(writer: W) -> Self {
        Self::with_config(writer, StreamWriterConfig::default())
    }

    /// Creates a new `Muxer`, configuring every logical bitstream with the given config.
    pub fn with_config(writer: W, config: StreamWriterConfig) -> Self {
        Self {
            writer,
            config,
            stream_states: Vec::new(),
        }
    }

    /// Consumes the `Muxer` and returns the writer.
    ///
    /// Data of logical bitstreams that were not ended is lost.
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Starts a new logical stream. Caller needs to provide the first packet, which will be
    /// written to the writer right away on a page of its own.
    pub fn begin_logical_stream(
        &mut self,
        bitstream_serial_number: u32,
        first_packet_data: &[u8],
    ) -> Result<(), WriteError> {
        if self
            .stream_states
            .iter()
            .any(|s| s.serial() == bitstream_serial_number)
        {
            return Err(WriteError::BitstreamAlreadyInitialized(
                bitstream_serial_number,
            ));
        }

        let mut state = StreamWriter::with_config(bitstream_serial_number, self.config);
        state.packet_in(&Packet::new(first_packet_data, 0))?;
        write_pages(&mut self.writer, &mut state, true)?;

        debug!("began logical bitstream {}", bitstream_serial_number);
        self.stream_states.push(state);

        Ok(())
    }

    /// Writes a logical stream that consists of a single packet. The packet is written right
    /// away on a page marking both the beginning and the end of the stream.
    pub fn write_single_packet_stream(
        &mut self,
        bitstream_serial_number: u32,
        packet_data: &[u8],
        granule_position: i64,
    ) -> Result<(), WriteError> {
        if self
            .stream_states
            .iter()
            .any(|s| s.serial() == bitstream_serial_number)
        {
            return Err(WriteError::BitstreamAlreadyInitialized(
                bitstream_serial_number,
            ));
        }

        let mut state = StreamWriter::with_config(bitstream_serial_number, self.config);
        state.packet_in(&Packet::new(packet_data, granule_position).with_eos())?;
        write_pages(&mut self.writer, &mut state, true)?;

        debug!("wrote single packet logical bitstream {}", bitstream_serial_number);

        Ok(())
    }

    /// Ends the logical stream. Caller needs to provide the last packet, which will be
    /// written by the writer right away. Any open pages for this stream will be flushed.
    pub fn end_logical_stream(
        &mut self,
        bitstream_serial_number: u32,
        last_packet_data: &[u8],
        granule_position: i64,
    ) -> Result<(), WriteError> {
        let index = self
            .stream_states
            .iter()
            .position(|s| s.serial() == bitstream_serial_number)
            .ok_or(WriteError::UnknownBitstreamSerialNumber(
                bitstream_serial_number,
            ))?;

        let mut state = self.stream_states.remove(index);

        write_pages(&mut self.writer, &mut state, true)?;
        state.packet_in(&Packet::new(last_packet_data, granule_position).with_eos())?;
        write_pages(&mut self.writer, &mut state, true)?;

        debug!("ended logical bitstream {}", bitstream_serial_number);

        Ok(())
    }

    /// Queues the given data as a packet to be written to the writer for the specified
    /// logical bitstream. Caller need to begin a stream with `begin_logical_stream()` and
    /// close it with `end_logical_stream()`.
    ///
    /// Packets are assembled in pages, which are written once they are full or `flush()` was
    /// called manually. Packets bigger than a page are continued on the following pages.
    pub fn push_packet(
        &mut self,
        bitstream_serial_number: u32,
        packet_data: &[u8],
        granule_position: i64,
    ) -> Result<(), WriteError> {
        let state = find_state(&mut self.stream_states, bitstream_serial_number)?;
        state.packet_in(&Packet::new(packet_data, granule_position))?;
        write_pages(&mut self.writer, state, false)
    }

    /// The current page of the logical bitstream is written and a new page is started.
    pub fn flush(&mut self, bitstream_serial_number: u32) -> Result<(), WriteError> {
        let state = find_state(&mut self.stream_states, bitstream_serial_number)?;
        write_pages(&mut self.writer, state, true)?;
        self.writer.flush()?;

        Ok(())
    }

    /// Returns true if the current page for the given logical bitstream contains no data.
    pub fn page_is_empty(&self, bitstream_serial_number: u32) -> Result<bool, WriteError> {
        let state = self
            .stream_states
            .iter()
            .find(|s| s.serial() == bitstream_serial_number)
            .ok_or(WriteError::UnknownBitstreamSerialNumber(
                bitstream_serial_number,
            ))?;

        Ok(state.page_is_empty())
    }
}

fn find_state(
    stream_states: &mut [StreamWriter],
    bitstream_serial_number: u32,
) -> Result<&mut StreamWriter, WriteError> {
    stream_states
        .iter_mut()
        .find(|s| s.serial() == bitstream_serial_number)
        .ok_or(WriteError::UnknownBitstreamSerialNumber(
            bitstream_serial_number,
        ))
}

fn write_pages<W: Write>(
    writer: &mut W,
    state: &mut StreamWriter,
    force_flush: bool,
) -> Result<(), WriteError> {
    for page in state.drain_pages(force_flush) {
        page.write_to(writer)?;
    }
    Ok(())
}
