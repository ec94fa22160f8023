use crate::constants::CALIBRATION_STORAGE_KEY;
use crate::detection::CalibrationData;
use crate::store::{Store, StoreError};

fn validate(data: &CalibrationData) -> Result<(), StoreError> {
    let finite = [data.open_baseline, data.closed_baseline, data.threshold]
        .iter()
        .all(|v| v.is_finite());
    if !finite {
        return Err(StoreError::Validation(
            "calibration values must be finite".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&data.threshold) {
        return Err(StoreError::Validation(
            "threshold must be within [0, 1]".to_string(),
        ));
    }
    Ok(())
}

impl Store {
    /// 读取已保存的校准数据；记录损坏时视为未校准
    pub fn load_calibration(&self) -> Result<Option<CalibrationData>, StoreError> {
        let Some(raw) = self.settings.get(CALIBRATION_STORAGE_KEY.as_bytes())? else {
            return Ok(None);
        };
        match Self::deserialize::<CalibrationData>(&raw) {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                tracing::warn!(error = %e, "Stored calibration is unreadable, ignoring it");
                Ok(None)
            }
        }
    }

    pub fn save_calibration(&self, data: &CalibrationData) -> Result<(), StoreError> {
        validate(data)?;
        self.settings
            .insert(CALIBRATION_STORAGE_KEY.as_bytes(), Self::serialize(data)?)?;
        tracing::info!(threshold = data.threshold, "Calibration saved");
        Ok(())
    }

    pub fn clear_calibration(&self) -> Result<(), StoreError> {
        self.settings.remove(CALIBRATION_STORAGE_KEY.as_bytes())?;
        Ok(())
    }
}
