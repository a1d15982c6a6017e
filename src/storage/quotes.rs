use std::ops::RangeInclusive;

use chrono::Utc;
use rand::seq::SliceRandom;
use redb::ReadableTable;

use super::db::{decode, encode, Database, StoreError};
use super::models::{BatchReport, Quote};
use super::tables::*;

pub const DEFAULT_QUOTE_SOURCE: &str = "Anonymous";

pub const QUOTE_INTERVAL_KEY: &str = "quote_popup_interval";
pub const FADE_OUT_DELAY_KEY: &str = "fade_out_delay";

/// 24 hours
pub const DEFAULT_QUOTE_INTERVAL_MS: u64 = 86_400_000;
pub const DEFAULT_FADE_OUT_DELAY_MS: u64 = 5_000;
pub const FADE_OUT_DELAY_RANGE_MS: RangeInclusive<u64> = 1_000..=60_000;

/// Split one import line into quote text and source
fn parse_quote_line(line: &str) -> (&str, &str) {
    let (quote, source) = match line.split_once('|') {
        Some((quote, source)) => (quote.trim(), source.trim()),
        None => (line.trim(), ""),
    };
    let source = if source.is_empty() {
        DEFAULT_QUOTE_SOURCE
    } else {
        source
    };
    (quote, source)
}

impl Database {
    // ========================================================================
    // Quote operations
    // ========================================================================

    /// Import quotes, one `quote|source` per line. Blank lines are skipped;
    /// errors are reported with 1-based line numbers.
    pub fn import_quotes(&self, text: &str) -> Result<BatchReport, StoreError> {
        let now = Utc::now();
        let write_txn = self.begin_write()?;
        let report = {
            let mut quotes_table = write_txn.open_table(QUOTES)?;
            let mut texts_table = write_txn.open_table(QUOTE_TEXTS)?;
            let mut report = BatchReport::default();

            let mut next_id = match quotes_table.last()? {
                Some((key, _)) => key.value() + 1,
                None => 1,
            };

            for (index, line) in text.lines().enumerate() {
                let line_no = index + 1;
                if line.trim().is_empty() {
                    continue;
                }

                let (quote, source) = parse_quote_line(line);
                if quote.is_empty() {
                    report.failed(format!("line {line_no}: quote text is empty"));
                    continue;
                }
                if texts_table.get(quote)?.is_some() {
                    report.failed(format!("line {line_no}: quote already exists"));
                    continue;
                }

                let record = Quote {
                    created_at: now,
                    id: next_id,
                    quote: quote.to_string(),
                    source: source.to_string(),
                };
                let data = encode(&record)?;
                quotes_table.insert(next_id, data.as_slice())?;
                texts_table.insert(quote, next_id)?;
                next_id += 1;
                report.succeeded();
            }
            report
        };
        write_txn.commit()?;

        tracing::info!(
            imported = report.success_count,
            failed = report.failed_count,
            "Imported quotes"
        );
        Ok(report)
    }

    /// All quotes in insertion order
    pub fn list_quotes(&self) -> Result<Vec<Quote>, StoreError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(QUOTES)?;

        let mut quotes = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            quotes.push(decode(value.value())?);
        }
        Ok(quotes)
    }

    /// A uniformly random quote, or `None` when there are none
    pub fn random_quote(&self) -> Result<Option<Quote>, StoreError> {
        let quotes = self.list_quotes()?;
        Ok(quotes.choose(&mut rand::thread_rng()).cloned())
    }

    /// Delete a quote by id
    pub fn delete_quote(&self, id: u64) -> Result<Quote, StoreError> {
        let write_txn = self.begin_write()?;
        let quote = {
            let mut quotes_table = write_txn.open_table(QUOTES)?;
            let quote: Quote = match quotes_table.remove(id)? {
                Some(data) => decode(data.value())?,
                None => return Err(StoreError::NotFound(format!("Quote {id}"))),
            };
            let mut texts_table = write_txn.open_table(QUOTE_TEXTS)?;
            texts_table.remove(quote.quote.as_str())?;
            quote
        };
        write_txn.commit()?;

        tracing::debug!(id, "Deleted quote");
        Ok(quote)
    }

    // ========================================================================
    // System settings
    // ========================================================================

    fn setting(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value()))
    }

    fn put_setting(&self, key: &str, value: u64) -> Result<(), StoreError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        tracing::info!(key = %key, value, "Updated setting");
        Ok(())
    }

    /// How often the quote popup appears, in milliseconds
    pub fn quote_interval(&self) -> Result<u64, StoreError> {
        Ok(self
            .setting(QUOTE_INTERVAL_KEY)?
            .unwrap_or(DEFAULT_QUOTE_INTERVAL_MS))
    }

    pub fn set_quote_interval(&self, interval_ms: i64) -> Result<u64, StoreError> {
        let interval_ms = u64::try_from(interval_ms).map_err(|_| {
            StoreError::Validation("interval must be a non-negative number".to_string())
        })?;
        self.put_setting(QUOTE_INTERVAL_KEY, interval_ms)?;
        Ok(interval_ms)
    }

    /// How long the quote popup stays before fading out, in milliseconds
    pub fn fade_out_delay(&self) -> Result<u64, StoreError> {
        Ok(self
            .setting(FADE_OUT_DELAY_KEY)?
            .unwrap_or(DEFAULT_FADE_OUT_DELAY_MS))
    }

    pub fn set_fade_out_delay(&self, delay_ms: i64) -> Result<u64, StoreError> {
        let delay_ms = u64::try_from(delay_ms)
            .ok()
            .filter(|ms| FADE_OUT_DELAY_RANGE_MS.contains(ms))
            .ok_or_else(|| {
                StoreError::Validation(format!(
                    "delay must be between {} and {} milliseconds",
                    FADE_OUT_DELAY_RANGE_MS.start(),
                    FADE_OUT_DELAY_RANGE_MS.end()
                ))
            })?;
        self.put_setting(FADE_OUT_DELAY_KEY, delay_ms)?;
        Ok(delay_ms)
    }
}
