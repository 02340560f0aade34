//! Product identifiers used across end-to-end tests.

#![allow(dead_code)]

pub const ONLINE_ID: &str = "S2A_MSIL1C_20190501T101031_N0207_R022_T32TQM_20190501T121424";
pub const PRESENT_ID: &str = "S2B_MSIL1C_20190502T100029_N0207_R122_T33TUG_20190502T120503";
pub const ARCHIVED_ID: &str = "S2A_MSIL1C_20180611T101031_N0206_R022_T32TQM_20180611T122207";
pub const MISSING_ID: &str = "S2A_MSIL1C_20170101T101402_N0204_R022_T32TQM_20170101T101404";

pub const USERNAME: &str = "test-user";
pub const PASSWORD: &str = "test-password";

pub const PRIMARY_BUCKET: &str = "scenes-primary";
pub const ARCHIVE_BUCKET: &str = "scenes-archive";

/// Catalogue pid for an identifier, derived from its sensing time.
pub fn pid_for(identifier: &str) -> String {
    format!("pid-{}", identifier[11..26].to_lowercase())
}
