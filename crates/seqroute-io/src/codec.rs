//! Sequencer payload to MIDI wire bytes.

use seqroute_core::{Error, Result, SeqEvent};
use smallvec::{smallvec, SmallVec};

/// One decoded channel message (1 to 3 bytes, never heap-allocated).
pub type MidiBytes = SmallVec<[u8; 3]>;

/// Musical event type tags of the kernel sequencer.
pub mod tags {
    pub const NOTEON: u8 = 6;
    pub const NOTEOFF: u8 = 7;
    pub const KEYPRESS: u8 = 8;
    pub const CONTROLLER: u8 = 10;
    pub const PGMCHANGE: u8 = 11;
    pub const CHANPRESS: u8 = 12;
    pub const PITCHBEND: u8 = 13;
}

const PITCH_BEND_MIN: i32 = -8192;
const PITCH_BEND_MAX: i32 = 8191;

/// Decodes a musical event into MIDI bytes.
///
/// `Ok(None)` for every tag that carries no channel message. Out-of-range
/// fields are `MalformedEvent`.
pub fn decode(event: &SeqEvent) -> Result<Option<MidiBytes>> {
    let bytes = match event.event_type {
        tags::NOTEON => note(event, 0x90)?,
        tags::NOTEOFF => note(event, 0x80)?,
        tags::KEYPRESS => note(event, 0xA0)?,
        tags::CONTROLLER => {
            let status = 0xB0 | channel(event)?;
            let param = data7("controller number", word(event, 4)?)?;
            let value = data7("controller value", word(event, 8)?)?;
            smallvec![status, param, value]
        }
        tags::PGMCHANGE => {
            let status = 0xC0 | channel(event)?;
            smallvec![status, data7("program", word(event, 8)?)?]
        }
        tags::CHANPRESS => {
            let status = 0xD0 | channel(event)?;
            smallvec![status, data7("pressure", word(event, 8)?)?]
        }
        tags::PITCHBEND => {
            let status = 0xE0 | channel(event)?;
            let value = word(event, 8)? as i32;
            if !(PITCH_BEND_MIN..=PITCH_BEND_MAX).contains(&value) {
                return Err(Error::MalformedEvent(format!(
                    "pitch bend {} out of range",
                    value
                )));
            }
            // Signed 14-bit to unsigned, split into two 7-bit bytes
            let unsigned = (value - PITCH_BEND_MIN) as u16;
            smallvec![status, (unsigned & 0x7F) as u8, ((unsigned >> 7) & 0x7F) as u8]
        }
        _ => return Ok(None),
    };
    Ok(Some(bytes))
}

fn note(event: &SeqEvent, status: u8) -> Result<MidiBytes> {
    let status = status | channel(event)?;
    let key = data7("note", event.data[1] as i64)?;
    let velocity = data7("velocity", event.data[2] as i64)?;
    Ok(smallvec![status, key, velocity])
}

fn channel(event: &SeqEvent) -> Result<u8> {
    let ch = event.data[0];
    if ch > 15 {
        return Err(Error::MalformedEvent(format!("channel {} out of range", ch)));
    }
    Ok(ch)
}

/// Signed view of the 32-bit payload field at `offset`.
fn word(event: &SeqEvent, offset: usize) -> Result<i64> {
    event
        .i32_at(offset)
        .map(i64::from)
        .ok_or_else(|| Error::MalformedEvent(format!("no payload field at {}", offset)))
}

fn data7(field: &str, value: i64) -> Result<u8> {
    if !(0..=127).contains(&value) {
        return Err(Error::MalformedEvent(format!(
            "{} {} exceeds 7 bits",
            field, value
        )));
    }
    Ok(value as u8)
}
