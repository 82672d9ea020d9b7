use crate::storage::entry::Entry;
use crate::AppError;

pub fn encode(entry: &Entry) -> Result<Vec<u8>, AppError> {
    Ok(bincode::serialize(entry)?)
}

pub fn decode(bytes: &[u8]) -> Result<Entry, AppError> {
    Ok(bincode::deserialize(bytes)?)
}
