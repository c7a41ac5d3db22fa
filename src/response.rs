use std::io::Write;

use anyhow::{Context, Result};
use serde_json::{Value, json};

use crate::event::EventDto;

/// Successful outcome of one invocation.
#[derive(Debug, PartialEq, Eq)]
pub enum Response {
    Events(Vec<EventDto>),
    Created { id: String },
    Done,
}

impl Response {
    /// `serde_json::Value` objects keep their keys sorted, which gives the
    /// output a stable key order.
    pub fn to_value(&self) -> Result<Value> {
        Ok(match self {
            Response::Events(events) => serde_json::to_value(events)?,
            Response::Created { id } => json!({ "success": true, "id": id }),
            Response::Done => json!({ "success": true }),
        })
    }
}

/// Renders the whole document before touching `out`, so a failure never
/// leaves half a JSON value behind.
pub fn write_response<W: Write>(out: &mut W, response: &Response) -> Result<()> {
    let mut rendered = serde_json::to_vec_pretty(&response.to_value()?)?;
    rendered.push(b'\n');
    out.write_all(&rendered)
        .context("failed to write response to stdout")?;
    out.flush().context("failed to flush stdout")?;
    Ok(())
}
