use chrono::Utc;
use shared::{parse_calendar_date, Holiday, HolidayRequest};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::error::{RecordError, RecordResult};
use super::models::optional_text;
use crate::storage::RecordStore;

const REQUIRED_FIELDS: &str = "Date and description are required";

/// Service for the school holiday calendar
#[derive(Clone)]
pub struct HolidayService {
    store: Arc<dyn RecordStore>,
    write_lock: Arc<Mutex<()>>,
}

impl HolidayService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn create_holiday(&self, request: HolidayRequest) -> RecordResult<Holiday> {
        let (date, description) = validate(request)?;

        let holiday = Holiday {
            id: Uuid::new_v4().to_string(),
            date,
            description,
            created_at: Utc::now(),
        };

        let _guard = self.write_lock.lock().await;
        self.store.insert_holiday(&holiday).await?;

        info!("Created holiday {} on {}", holiday.id, holiday.date);
        Ok(holiday)
    }

    pub async fn get_holiday(&self, id: &str) -> RecordResult<Holiday> {
        self.store
            .get_holiday(id)
            .await?
            .ok_or(RecordError::NotFound("Holiday"))
    }

    /// All holidays in date order
    pub async fn list_holidays(&self) -> RecordResult<Vec<Holiday>> {
        let holidays = self.store.list_holidays().await?;
        info!("Found {} holidays", holidays.len());
        Ok(holidays)
    }

    /// Replace both date and description
    pub async fn update_holiday(&self, id: &str, request: HolidayRequest) -> RecordResult<Holiday> {
        let (date, description) = validate(request)?;

        let _guard = self.write_lock.lock().await;

        let mut holiday = self
            .store
            .get_holiday(id)
            .await?
            .ok_or(RecordError::NotFound("Holiday"))?;
        holiday.date = date;
        holiday.description = description;

        if !self.store.replace_holiday(&holiday).await? {
            return Err(RecordError::NotFound("Holiday"));
        }

        info!("Updated holiday {}", id);
        Ok(holiday)
    }

    pub async fn delete_holiday(&self, id: &str) -> RecordResult<()> {
        let _guard = self.write_lock.lock().await;

        if !self.store.delete_holiday(id).await? {
            return Err(RecordError::NotFound("Holiday"));
        }

        info!("Deleted holiday {}", id);
        Ok(())
    }
}

fn validate(request: HolidayRequest) -> RecordResult<(chrono::NaiveDate, String)> {
    let (Some(raw_date), Some(description)) = (
        optional_text(request.date),
        optional_text(request.description),
    ) else {
        return Err(RecordError::validation(REQUIRED_FIELDS));
    };
    let date = parse_calendar_date(&raw_date).map_err(RecordError::Validation)?;
    Ok((date, description))
}
