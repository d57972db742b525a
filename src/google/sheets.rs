//! Google Sheets: append one row per answered message

use super::auth::{GoogleAuth, SCOPE_SPREADSHEETS, SERVICE};
use crate::error::{read_success_body, UpstreamError, UpstreamResult};
use crate::relay::ChatRecord;
use chrono::SecondsFormat;
use serde::Serialize;
use std::sync::Arc;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const LOG_RANGE: &str = "Sheet1!A:D";

#[derive(Debug, Serialize)]
struct ValueRange {
    values: Vec<[String; 4]>,
}

/// `[timestamp, sender, message, response]`
fn record_row(record: &ChatRecord) -> [String; 4] {
    [
        record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        record.sender.clone(),
        record.message.clone(),
        record.response.clone(),
    ]
}

/// Chat log backed by the spreadsheet configured by `GOOGLE_SHEET_ID_LOGS`
pub struct GoogleSheetsLog {
    auth: Arc<GoogleAuth>,
    spreadsheet_id: String,
}

impl GoogleSheetsLog {
    pub fn new(auth: Arc<GoogleAuth>, spreadsheet_id: String) -> Self {
        Self {
            auth,
            spreadsheet_id,
        }
    }

    pub async fn append_record(&self, record: &ChatRecord) -> UpstreamResult<()> {
        let token = self.auth.access_token(SCOPE_SPREADSHEETS).await?;

        let response = self
            .auth
            .client()
            .post(format!(
                "{SHEETS_API}/{}/values/{LOG_RANGE}:append",
                self.spreadsheet_id
            ))
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .bearer_auth(token)
            .json(&ValueRange {
                values: vec![record_row(record)],
            })
            .send()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, &e))?;

        let body = read_success_body(SERVICE, response).await?;
        tracing::debug!(sender = %record.sender, response = %body, "Chat logged to sheet");
        Ok(())
    }
}
