pub mod config;
pub mod doctor;
pub mod key;
pub mod ssh;

use serde::Serialize;

use crate::error::Result;

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
