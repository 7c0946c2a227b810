//! Coordinate reference system identifiers.
//!
//! Conversions never reproject; a CRS travels with the data as an identifier
//! (`EPSG:<code>`) or, when nothing better is known, as the WKT it was read
//! from.

/// EPSG code of WGS 84 geographic coordinates.
pub const WGS84: i32 = 4326;

/// `gpkg_spatial_ref_sys` definition for WGS 84.
pub const WGS84_GPKG_DEFINITION: &str = concat!(
    r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,"#,
    r#"AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,"#,
    r#"AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],"#,
    r#"AXIS["Latitude",NORTH],AXIS["Longitude",EAST],AUTHORITY["EPSG","4326"]]"#
);

/// ESRI-flavoured WKT written to `.prj` files for WGS 84.
pub const WGS84_ESRI_PRJ: &str = concat!(
    r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],"#,
    r#"PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#
);

/// Formats an EPSG code as `EPSG:<code>`.
#[must_use]
pub fn epsg(code: i32) -> String {
    format!("EPSG:{code}")
}

/// Extracts the EPSG code from identifiers such as `EPSG:4326`,
/// `epsg:3857` or `urn:ogc:def:crs:EPSG::4326`. `OGC:CRS84` maps to 4326.
#[must_use]
pub fn parse_epsg(crs: &str) -> Option<i32> {
    let crs = crs.trim();
    let upper = crs.to_ascii_uppercase();
    if upper == "OGC:CRS84" || upper.ends_with("OGC:1.3:CRS84") {
        return Some(WGS84);
    }
    let (authority, code) = upper.rsplit_once(':')?;
    if !authority.trim_end_matches(':').ends_with("EPSG") {
        return None;
    }
    code.parse().ok().filter(|code| *code > 0)
}

/// Interprets the contents of a `.prj` file.
///
/// WGS 84 geographic definitions become `EPSG:4326`; anything else is kept
/// verbatim.
#[must_use]
pub fn from_prj(wkt: &str) -> Option<String> {
    let wkt = wkt.trim();
    if wkt.is_empty() {
        return None;
    }
    let geographic = wkt.starts_with("GEOGCS[") || wkt.starts_with("GEOGCRS[");
    if geographic && (wkt.contains("WGS_1984") || wkt.contains("WGS 84")) {
        Some(epsg(WGS84))
    } else {
        Some(wkt.to_string())
    }
}
