//! Coordinate Reference System handling

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
    /// PROJ string if available
    proj: Option<String>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
            proj: None,
        }
    }

    /// Create a CRS from a WKT string.
    ///
    /// The EPSG code is picked up from the outermost `AUTHORITY["EPSG",..]`
    /// (or `ID["EPSG",..]`) clause when present.
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        let wkt = wkt.into();
        let epsg = wkt_authority_code(&wkt);
        Self {
            wkt: Some(wkt),
            epsg,
            proj: None,
        }
    }

    /// Create a CRS from a PROJ string
    pub fn from_proj(proj: impl Into<String>) -> Self {
        Self {
            wkt: None,
            epsg: None,
            proj: Some(proj.into()),
        }
    }

    /// Parse a user or file supplied CRS identifier.
    ///
    /// Accepts `EPSG:32611`, `epsg:4326`, OGC URNs such as
    /// `urn:ogc:def:crs:EPSG::4326`, `+proj=` strings and WKT. Returns
    /// `None` for empty input.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if text.starts_with('+') {
            return Some(Self::from_proj(text));
        }
        if text.contains('[') {
            return Some(Self::from_wkt(text));
        }
        let upper = text.to_ascii_uppercase();
        if upper == "URN:OGC:DEF:CRS:OGC:1.3:CRS84" || upper == "CRS84" {
            return Some(Self::wgs84());
        }
        if let Some(idx) = upper.rfind("EPSG:") {
            // `EPSG:n`, `EPSG::n` and versioned `EPSG:6.3:n` all end in the code
            let code = upper[idx + 5..].rsplit(':').next().unwrap_or_default();
            return code.trim().parse().ok().map(Self::from_epsg);
        }
        Some(Self::from_proj(text))
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Get PROJ string
    pub fn proj(&self) -> Option<&str> {
        self.proj.as_deref()
    }

    /// Whether the EPSG code names a geographic (lat/lon) system
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, Some(4000..=4999))
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }

        // Textual comparison is imperfect but errs on the side of a mismatch
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }

        if let (Some(a), Some(b)) = (&self.proj, &other.proj) {
            return a == b;
        }

        false
    }

    /// OGC URN form used in GeoJSON `crs` members, when an EPSG code is known
    pub fn urn(&self) -> Option<String> {
        self.epsg.map(|code| format!("urn:ogc:def:crs:EPSG::{}", code))
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(proj) = &self.proj {
            return proj.clone();
        }
        if let Some(wkt) = &self.wkt {
            let head: String = wkt.chars().take(50).collect();
            return format!("WKT:{}", head);
        }
        "Unknown".to_string()
    }
}

/// Last `AUTHORITY["EPSG","n"]` / `ID["EPSG",n]` in a WKT string; the
/// outermost clause closes the WKT so it is the last one.
fn wkt_authority_code(wkt: &str) -> Option<u32> {
    let idx = wkt.rfind("\"EPSG\"")?;
    let rest = &wkt[idx + 6..];
    let digits: String = rest
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::from_epsg(4326);
        assert_eq!(crs.epsg(), Some(4326));
        assert_eq!(crs.identifier(), "EPSG:4326");
        assert!(crs.is_geographic());
    }

    #[test]
    fn test_crs_equivalence() {
        let a = CRS::from_epsg(4326);
        let b = CRS::wgs84();
        assert!(a.is_equivalent(&b));
        assert!(!a.is_equivalent(&CRS::from_epsg(32611)));
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(CRS::parse("EPSG:32611").unwrap().epsg(), Some(32611));
        assert_eq!(CRS::parse("epsg:4326").unwrap().epsg(), Some(4326));
        assert_eq!(
            CRS::parse("urn:ogc:def:crs:EPSG::3005").unwrap().epsg(),
            Some(3005)
        );
        assert_eq!(
            CRS::parse("urn:ogc:def:crs:EPSG:6.3:26911").unwrap().epsg(),
            Some(26911)
        );
        assert_eq!(
            CRS::parse("urn:ogc:def:crs:OGC:1.3:CRS84").unwrap().epsg(),
            Some(4326)
        );
        assert!(CRS::parse("+proj=longlat +datum=WGS84").unwrap().proj().is_some());
        assert!(CRS::parse("   ").is_none());
    }

    #[test]
    fn test_wkt_authority() {
        let wkt = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],AUTHORITY["EPSG","4326"]]"#;
        let crs = CRS::from_wkt(wkt);
        assert_eq!(crs.epsg(), Some(4326));
        assert!(crs.is_equivalent(&CRS::wgs84()));
    }

    #[test]
    fn test_urn() {
        assert_eq!(
            CRS::from_epsg(32611).urn().as_deref(),
            Some("urn:ogc:def:crs:EPSG::32611")
        );
        assert!(CRS::from_proj("+proj=utm").urn().is_none());
    }
}
