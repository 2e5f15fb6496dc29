// ============================================================
// Layer 3 — Sample Domain Types
// ============================================================
// A Sample is one labelled observation coming from the field:
//   - the feature vector read by the sensor board
//     (soil moisture, temperature, humidity, crop selection)
//   - the amount of water that turned out to be needed (mm)
//   - when it was recorded
//
// External collaborators hand us loosely shaped JSON records.
// `Features::from_json` and `Sample::from_json` are the only
// way those records enter the system, so a missing field or a
// string where a number belongs is caught here, at the edge.
//
// Example record:
//   {"soil_moisture": 35.2, "temperature": 28.1, "humidity": 55.4,
//    "crop_type": 0, "water_needed": 22.5}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::error::{LifecycleError, LifecycleResult};

/// Required feature names, in model input order.
pub const FEATURE_NAMES: [&str; 4] = ["soil_moisture", "temperature", "humidity", "crop_type"];

/// Name of the label field in append records.
pub const TARGET_NAME: &str = "water_needed";

/// Width of the numeric vector fed to a regressor:
/// 3 continuous readings + one-hot crop type.
pub const MODEL_INPUTS: usize = 3 + CropType::ALL.len();

// ─── CropType ─────────────────────────────────────────────────────────────────
/// Crop selected on the sensor board's switches.
/// The board reports the switch position as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum CropType {
    Tomato,
    Onion,
    MintBush,
}

impl CropType {
    pub const ALL: [CropType; 3] = [CropType::Tomato, CropType::Onion, CropType::MintBush];

    /// Integer code used on the wire and in CSV files.
    pub fn code(self) -> i64 {
        match self {
            CropType::Tomato   => 0,
            CropType::Onion    => 1,
            CropType::MintBush => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CropType::Tomato   => "tomato",
            CropType::Onion    => "onion",
            CropType::MintBush => "mint bush",
        }
    }

    /// Accepts a JSON/CSV number; it must be integral and a known code.
    pub fn from_number(value: f64) -> LifecycleResult<Self> {
        if !value.is_finite() || value.fract() != 0.0 {
            return Err(LifecycleError::validation(format!(
                "crop_type must be an integer, got {value}"
            )));
        }
        CropType::try_from(value as i64)
    }

    fn index(self) -> usize {
        self.code() as usize
    }
}

impl TryFrom<i64> for CropType {
    type Error = LifecycleError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        CropType::ALL
            .into_iter()
            .find(|c| c.code() == code)
            .ok_or_else(|| LifecycleError::validation(format!("unknown crop_type {code}")))
    }
}

impl From<CropType> for i64 {
    fn from(crop: CropType) -> Self {
        crop.code()
    }
}

// ─── Features ─────────────────────────────────────────────────────────────────
/// The named inputs used to predict water need.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Features {
    /// Soil moisture, percent
    pub soil_moisture: f64,
    /// Air temperature, °C
    pub temperature:   f64,
    /// Relative humidity, percent
    pub humidity:      f64,
    pub crop_type:     CropType,
}

impl Features {
    /// Build a validated feature vector.
    pub fn new(
        soil_moisture: f64,
        temperature:   f64,
        humidity:      f64,
        crop_type:     CropType,
    ) -> LifecycleResult<Self> {
        let features = Self { soil_moisture, temperature, humidity, crop_type };
        features.validate()?;
        Ok(features)
    }

    /// All continuous readings must be finite numbers.
    pub fn validate(&self) -> LifecycleResult<()> {
        for (name, value) in [
            ("soil_moisture", self.soil_moisture),
            ("temperature",   self.temperature),
            ("humidity",      self.humidity),
        ] {
            if !value.is_finite() {
                return Err(LifecycleError::validation(format!(
                    "feature '{name}' must be a finite number, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Parse a predict request shaped
    /// `{soil_moisture, temperature, humidity, crop_type}`.
    pub fn from_json(value: &Value) -> LifecycleResult<Self> {
        let obj = as_object(value)?;
        Self::new(
            required_number(obj, "soil_moisture")?,
            required_number(obj, "temperature")?,
            required_number(obj, "humidity")?,
            CropType::from_number(required_number(obj, "crop_type")?)?,
        )
    }

    /// Numeric input vector in `FEATURE_NAMES` order, crop one-hot encoded.
    pub fn to_model_input(&self) -> [f64; MODEL_INPUTS] {
        let mut input = [0.0; MODEL_INPUTS];
        input[0] = self.soil_moisture;
        input[1] = self.temperature;
        input[2] = self.humidity;
        input[3 + self.crop_type.index()] = 1.0;
        input
    }
}

// ─── Sample ───────────────────────────────────────────────────────────────────
/// One labelled training observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub features:    Features,
    /// Water needed, mm. Never negative.
    pub target:      f64,
    pub recorded_at: DateTime<Utc>,
}

impl Sample {
    pub fn new(features: Features, target: f64, recorded_at: DateTime<Utc>) -> LifecycleResult<Self> {
        let sample = Self { features, target, recorded_at };
        sample.validate()?;
        Ok(sample)
    }

    /// Same as `new` but stamped with the current time.
    pub fn now(features: Features, target: f64) -> LifecycleResult<Self> {
        Self::new(features, target, Utc::now())
    }

    pub fn validate(&self) -> LifecycleResult<()> {
        self.features.validate()?;
        if !self.target.is_finite() || self.target < 0.0 {
            return Err(LifecycleError::validation(format!(
                "{TARGET_NAME} must be a non-negative number, got {}",
                self.target
            )));
        }
        Ok(())
    }

    /// Parse an append record shaped
    /// `{soil_moisture, temperature, humidity, crop_type, water_needed}`
    /// with an optional RFC 3339 `recorded_at`.
    pub fn from_json(value: &Value) -> LifecycleResult<Self> {
        let obj      = as_object(value)?;
        let features = Features::from_json(value)?;
        let target   = required_number(obj, TARGET_NAME)?;

        let recorded_at = match obj.get("recorded_at") {
            None | Some(Value::Null) => Utc::now(),
            Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map_err(|e| LifecycleError::validation(format!("recorded_at: {e}")))?
                .with_timezone(&Utc),
            Some(other) => {
                return Err(LifecycleError::validation(format!(
                    "recorded_at must be an RFC 3339 string, got {other}"
                )))
            }
        };

        Self::new(features, target, recorded_at)
    }
}

/// A sample as held by the store, tagged with its append sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSample {
    pub seq:    u64,
    #[serde(flatten)]
    pub sample: Sample,
}

// ─── JSON helpers ─────────────────────────────────────────────────────────────
fn as_object(value: &Value) -> LifecycleResult<&Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| LifecycleError::validation("record must be a JSON object"))
}

fn required_number(obj: &Map<String, Value>, name: &str) -> LifecycleResult<f64> {
    match obj.get(name) {
        None | Some(Value::Null) => Err(LifecycleError::validation(format!(
            "missing required field '{name}'"
        ))),
        Some(v) => v.as_f64().ok_or_else(|| {
            LifecycleError::validation(format!("field '{name}' must be numeric, got {v}"))
        }),
    }
}
