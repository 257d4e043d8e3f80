//! Spatial reference identification from WKT text.

use crate::SpatialRef;

/// Well-known coordinate systems recognised by name when a WKT definition
/// carries no `AUTHORITY` clause.
const KNOWN_NAMES: &[(&str, i32)] = &[
    ("S-JTSK_Krovak_East_North", 5514),
    ("S-JTSK / Krovak East North", 5514),
    ("WGS_84_Pseudo_Mercator", 3857),
    ("WGS 84 / Pseudo-Mercator", 3857),
    ("ETRS89", 4258),
    ("GCS_ETRS_1989", 4258),
    ("GCS_WGS_1984", 4326),
    ("WGS 84", 4326),
];

/// Identify the EPSG code of a WKT definition.
///
/// The outermost `AUTHORITY["EPSG","<code>"]` clause wins. Without one the
/// root object's name is matched against a small table of well-known systems.
///
/// # Examples
/// ```
/// use layersync_core::identify_epsg;
///
/// let wkt = r#"GEOGCS["WGS 84",DATUM["WGS_1984"],AUTHORITY["EPSG","4326"]]"#;
/// assert_eq!(identify_epsg(wkt).map(|srs| srs.code), Some(4326));
/// assert_eq!(identify_epsg("LOCAL_CS[\"site grid\"]"), None);
/// ```
#[must_use]
pub fn identify_epsg(wkt: &str) -> Option<SpatialRef> {
    let code = root_authority_code(wkt).or_else(|| {
        let name = root_name(wkt)?;
        KNOWN_NAMES
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, code)| *code)
    })?;
    Some(SpatialRef::epsg(code).with_definition(wkt.trim()))
}

/// Code of the last `AUTHORITY["EPSG", ...]` clause sitting at nesting depth 1,
/// which in WKT1 belongs to the root object.
fn root_authority_code(wkt: &str) -> Option<i32> {
    let mut depth = 0_usize;
    let mut found = None;
    let mut rest = wkt;
    while let Some((offset, ch)) = rest.char_indices().find(|(_, c)| "[]A".contains(*c)) {
        let tail = rest.get(offset..)?;
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ => {
                if depth == 1
                    && let Some(code) = parse_authority(tail)
                {
                    found = Some(code);
                }
            }
        }
        rest = tail.get(ch.len_utf8()..)?;
    }
    found
}

fn parse_authority(text: &str) -> Option<i32> {
    let body = text.strip_prefix("AUTHORITY[")?;
    let end = body.find(']')?;
    let inner = body.get(..end)?;
    let mut parts = inner.split(',').map(|part| part.trim().trim_matches('"'));
    let authority = parts.next()?;
    let code = parts.next()?;
    if !authority.eq_ignore_ascii_case("EPSG") {
        return None;
    }
    code.parse().ok()
}

fn root_name(wkt: &str) -> Option<&str> {
    let open = wkt.find('[')?;
    let after = wkt.get(open + 1..)?.trim_start();
    let quoted = after.strip_prefix('"')?;
    let close = quoted.find('"')?;
    quoted.get(..close)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const KROVAK: &str = concat!(
        r#"PROJCS["S-JTSK / Krovak East North",GEOGCS["S-JTSK","#,
        r#"DATUM["System_Jednotne_Trigonometricke_Site_Katastralni","#,
        r#"AUTHORITY["EPSG","6156"]],AUTHORITY["EPSG","4156"]],"#,
        r#"PROJECTION["Krovak"],AUTHORITY["EPSG","5514"]]"#
    );

    #[rstest]
    fn prefers_root_authority_over_nested_ones() {
        let srs = identify_epsg(KROVAK).expect("identify Krovak");
        assert_eq!(srs.code, 5514);
        assert_eq!(srs.authority, "EPSG");
    }

    #[rstest]
    #[case(r#"PROJCS["S-JTSK_Krovak_East_North",GEOGCS["GCS_S_JTSK"]]"#, Some(5514))]
    #[case(r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984"]]"#, Some(4326))]
    #[case(r#"PROJCS["Custom",GEOGCS["GCS_WGS_1984"]]"#, None)]
    #[case("", None)]
    fn falls_back_to_known_names(#[case] wkt: &str, #[case] expected: Option<i32>) {
        assert_eq!(identify_epsg(wkt).map(|srs| srs.code), expected);
    }

    #[rstest]
    fn ignores_foreign_authorities() {
        let wkt = r#"PROJCS["Custom",AUTHORITY["ESRI","102067"]]"#;
        assert_eq!(identify_epsg(wkt), None);
    }
}
