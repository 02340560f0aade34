//! Object key derivation for offloaded products.
//!
//! Keys are computed from the product file name alone, so the same file
//! always lands at the same location. Sentinel-2 style names carry the
//! sensing time in the third `_` field and the MGRS tile in the sixth:
//! `S2A_MSIL1C_20190501T101031_N0207_R022_T32TQM_20190501T121424.zip`.

use chrono::{Datelike, NaiveDateTime};

use super::error::AcquisitionError;

const SENSING_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Layout of keys in the primary bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyLayout {
    /// `<file>`
    #[default]
    Flat,
    /// `MM-DD-YYYY/<file>`
    DatePrefixed,
}

impl KeyLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyLayout::Flat => "flat",
            KeyLayout::DatePrefixed => "date_prefixed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "flat" => Some(KeyLayout::Flat),
            "date_prefixed" => Some(KeyLayout::DatePrefixed),
            _ => None,
        }
    }
}

/// Tiling and timing metadata parsed from a product name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneName {
    pub sensing_time: NaiveDateTime,
    pub utm_zone: String,
    pub latitude_band: String,
    pub grid_square: String,
}

impl SceneName {
    pub fn parse(file_name: &str) -> Result<Self, AcquisitionError> {
        let malformed = || AcquisitionError::MalformedName(file_name.to_string());
        let fields: Vec<&str> = file_name.split('_').collect();

        let sensing_field = fields.get(2).ok_or_else(malformed)?;
        let sensing_time = NaiveDateTime::parse_from_str(sensing_field, SENSING_TIME_FORMAT)
            .map_err(|_| malformed())?;

        let tile = fields
            .get(5)
            .and_then(|t| t.strip_prefix('T'))
            .ok_or_else(malformed)?;
        let (utm_zone, latitude_band, grid_square) = split_tile(tile).ok_or_else(malformed)?;

        Ok(Self {
            sensing_time,
            utm_zone: utm_zone.to_string(),
            latitude_band: latitude_band.to_string(),
            grid_square: grid_square.to_string(),
        })
    }
}

/// Split `32TQM` into zone `32`, band `T` and square `QM`.
fn split_tile(tile: &str) -> Option<(&str, &str, &str)> {
    if tile.len() != 5 || !tile.is_ascii() {
        return None;
    }
    let (zone, rest) = tile.split_at(2);
    let (band, square) = rest.split_at(1);
    if !zone.chars().all(|c| c.is_ascii_digit())
        || !band.chars().all(|c| c.is_ascii_alphabetic())
        || !square.chars().all(|c| c.is_ascii_alphabetic())
    {
        return None;
    }
    Some((zone, band, square))
}

/// Key in the primary bucket.
pub fn primary_key(layout: KeyLayout, file_name: &str) -> Result<String, AcquisitionError> {
    match layout {
        KeyLayout::Flat => Ok(file_name.to_string()),
        KeyLayout::DatePrefixed => {
            let scene = SceneName::parse(file_name)?;
            Ok(format!(
                "{}/{}",
                scene.sensing_time.format("%m-%d-%Y"),
                file_name
            ))
        }
    }
}

/// Partition key in the archive bucket: `<zone>/<band>/<square>/<YYYY>/<M>/<D>/<file>`.
pub fn archive_key(file_name: &str) -> Result<String, AcquisitionError> {
    let scene = SceneName::parse(file_name)?;
    let date = scene.sensing_time.date();
    Ok(format!(
        "{}/{}/{}/{}/{}/{}/{}",
        scene.utm_zone,
        scene.latitude_band,
        scene.grid_square,
        date.year(),
        date.month(),
        date.day(),
        file_name
    ))
}
