// Raw channel rows -> metric points.
// A missing column omits its field; a present value that does not parse fails the row.

use crate::models::{ChannelKind, FieldValue, MetricPoint};
use crate::table::RawRecord;
use crate::units::{self, ParsedValue, ValueError};
use chrono::{DateTime, Utc};
use thiserror::Error;

pub const CHANNEL_ID_TAG: &str = "channel_id";

/// Cell text the modem prints for an inactive upstream channel.
pub const PLACEHOLDER: &str = "----";

// Column headers as printed on the status page.
const COL_CHANNEL_ID: &str = "Channel ID";
const COL_CHANNEL: &str = "Channel";
const COL_LOCK_STATUS: &str = "Lock Status";
const COL_MODULATION: &str = "Modulation";
const COL_US_CHANNEL_TYPE: &str = "US Channel Type";
const COL_SYMBOL_RATE: &str = "Symbol Rate";
const COL_FREQUENCY: &str = "Frequency";
const COL_POWER: &str = "Power";
const COL_SNR: &str = "SNR";
const COL_CORRECTED: &str = "Corrected";
const COL_UNCORRECTABLES: &str = "Uncorrectables";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("no channel id")]
    MissingChannelId,
    #[error("{column} {value:?}: {source}")]
    Malformed {
        column: &'static str,
        value: String,
        #[source]
        source: ValueError,
    },
    #[error("channel {channel_id}: placeholder {column} {value:?}")]
    Placeholder {
        channel_id: String,
        column: &'static str,
        value: String,
    },
}

/// Accumulates fields for one row; each method is a no-op when its column is missing.
struct RowReader<'r> {
    record: &'r RawRecord,
    point: MetricPoint,
}

impl<'r> RowReader<'r> {
    fn cell(&self, column: &str) -> Option<&'r str> {
        self.record.get(column).map(String::as_str)
    }

    fn text(&mut self, column: &'static str, field: &str) {
        if let Some(value) = self.cell(column) {
            self.point.fields.insert(field.to_string(), value.into());
        }
    }

    fn count(&mut self, column: &'static str, field: &str) -> Result<(), RecordError> {
        let Some(value) = self.cell(column) else {
            return Ok(());
        };
        let n = units::parse_count(value).map_err(|source| RecordError::Malformed {
            column,
            value: value.to_string(),
            source,
        })?;
        self.point.fields.insert(field.to_string(), FieldValue::Int(n));
        Ok(())
    }

    /// Present values become fields, absent ones are skipped.
    fn reading<T: Into<FieldValue>>(
        &mut self,
        column: &'static str,
        field: &str,
        parse: fn(&str) -> ParsedValue<T>,
    ) -> Result<(), RecordError> {
        let Some(value) = self.cell(column) else {
            return Ok(());
        };
        let parsed = parse(value)
            .into_result()
            .map_err(|source| RecordError::Malformed {
                column,
                value: value.to_string(),
                source,
            })?;
        if let Some(v) = parsed {
            self.point.fields.insert(field.to_string(), v.into());
        }
        Ok(())
    }
}

/// Builds the point for one row of the `kind` table, stamped with `captured_at`.
pub fn build_point(
    kind: ChannelKind,
    record: &RawRecord,
    captured_at: DateTime<Utc>,
) -> Result<MetricPoint, RecordError> {
    let channel_id = record
        .get(COL_CHANNEL_ID)
        .filter(|id| !id.is_empty())
        .ok_or(RecordError::MissingChannelId)?;

    let mut row = RowReader {
        record,
        point: MetricPoint::new(kind.measurement(), captured_at),
    };
    row.point
        .tags
        .insert(CHANNEL_ID_TAG.to_string(), channel_id.clone());

    row.count(COL_CHANNEL, "channel")?;
    row.text(COL_LOCK_STATUS, "lock_status");

    match kind {
        ChannelKind::Downstream => {
            row.text(COL_MODULATION, "modulation");
            row.reading(COL_FREQUENCY, "frequency", units::parse_frequency)?;
            row.reading(COL_POWER, "power", units::parse_power_level)?;
            row.reading(COL_SNR, "snr", units::parse_snr)?;
            row.count(COL_CORRECTED, "corrected")?;
            row.count(COL_UNCORRECTABLES, "uncorrectable")?;
        }
        ChannelKind::Upstream => {
            row.text(COL_US_CHANNEL_TYPE, "channel_type");
            row.reading(COL_SYMBOL_RATE, "symbol_rate", units::parse_symbol_rate)?;
            if let Some(value) = row.cell(COL_FREQUENCY).filter(|v| *v == PLACEHOLDER) {
                return Err(RecordError::Placeholder {
                    channel_id: channel_id.clone(),
                    column: COL_FREQUENCY,
                    value: value.to_string(),
                });
            }
            row.reading(COL_FREQUENCY, "frequency", units::parse_frequency)?;
            row.reading(COL_POWER, "power", units::parse_power_level)?;
        }
    }

    Ok(row.point)
}
