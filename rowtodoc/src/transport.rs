//!
//! Binary framing of row batches passed between stages.
//!
//! A frame is one version byte followed by the bincode encoding of the batch.
//! Column order, scalar types and explicit nulls all survive the round trip.
//!

use crate::row::Row;
use crate::{RowToDocError, RowToDocResult};

const FRAME_VERSION: u8 = 1;

pub fn encode_batch(rows: &[Row]) -> RowToDocResult<Vec<u8>> {
    let mut frame = vec![FRAME_VERSION];
    bincode::serialize_into(&mut frame, rows)?;
    Ok(frame)
}

pub fn decode_batch(frame: &[u8]) -> RowToDocResult<Vec<Row>> {
    match frame.split_first() {
        Some((&FRAME_VERSION, payload)) => Ok(bincode::deserialize(payload)?),
        Some((version, _)) => Err(RowToDocError::Frame(format!(
            "unsupported frame version {}",
            version
        ))),
        None => Err(RowToDocError::Frame("empty frame".to_string())),
    }
}
