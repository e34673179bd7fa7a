//! Self-describing buffer of records
//!
//! The buffer is a JSON document `{"version": 1, "records": [...]}`. Every
//! cell value is tagged with its variant so that reading it back gives the
//! exact records that were written, non-finite numbers included.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::mapper::Record;

const VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    records: &'a [Record],
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    records: Vec<Record>,
}

/// Serializes records into a transport buffer
pub fn to_vec(records: &[Record]) -> Result<Vec<u8>, Error> {
    let buf = serde_json::to_vec(&EnvelopeRef {
        version: VERSION,
        records,
    })?;
    debug!("{} records dumped into {} bytes", records.len(), buf.len());
    Ok(buf)
}

/// Reads back a buffer written by [`to_vec`]
pub fn from_slice(buf: &[u8]) -> Result<Vec<Record>, Error> {
    let envelope: Envelope = serde_json::from_slice(buf)?;
    if envelope.version != VERSION {
        return Err(Error::Transport(serde::de::Error::custom(format!(
            "unsupported transport version {}",
            envelope.version
        ))));
    }
    Ok(envelope.records)
}
