//! Font naming-table extraction: English-locale name records plus the
//! monospace flag, reported at contract level for font pickers.

use std::path::Path;

use ttf_parser::{name_id, Face, PlatformId};

use crate::{ErrorKind, Result};

/// English-locale name records of a font file. Absent records stay `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FontMetadata {
    pub family: Option<String>,
    pub subfamily: Option<String>,
    pub id: Option<String>,
    pub fullname: Option<String>,
    pub version: Option<String>,
    pub psname: Option<String>,
    pub tfamily: Option<String>,
    pub tsubfamily: Option<String>,
    pub wwsfamily: Option<String>,
    pub wwssubfamily: Option<String>,
    pub monospaced: bool,
}

/// True for the English locales of the Windows and Macintosh name platforms.
fn is_english(platform: PlatformId, language_id: u16) -> bool {
    match platform {
        // Windows primary language ID 0x09 covers every English variant.
        PlatformId::Windows => language_id & 0x3FF == 0x09,
        PlatformId::Macintosh => language_id == 0,
        PlatformId::Unicode => true,
        _ => false,
    }
}

/// Reads the naming table of the font file at `path`.
///
/// Errors: the file cannot be opened (i/o), the face does not parse, or no
/// English name records are present.
pub fn font_metadata<P: AsRef<Path>>(path: P) -> Result<FontMetadata> {
    let data = std::fs::read(path.as_ref())?;
    let face = Face::parse(&data, 0)?;

    let mut meta = FontMetadata {
        monospaced: face.is_monospaced(),
        ..Default::default()
    };
    let mut found = 0usize;

    let names = face.names();
    for i in 0..names.len() {
        let Some(name) = names.get(i) else { continue };
        if !is_english(name.platform_id, name.language_id) {
            continue;
        }
        let Some(value) = name.to_string() else { continue };
        let slot = match name.name_id {
            name_id::FAMILY => &mut meta.family,
            name_id::SUBFAMILY => &mut meta.subfamily,
            name_id::UNIQUE_ID => &mut meta.id,
            name_id::FULL_NAME => &mut meta.fullname,
            name_id::VERSION => &mut meta.version,
            name_id::POST_SCRIPT_NAME => &mut meta.psname,
            name_id::TYPOGRAPHIC_FAMILY => &mut meta.tfamily,
            name_id::TYPOGRAPHIC_SUBFAMILY => &mut meta.tsubfamily,
            name_id::WWS_FAMILY => &mut meta.wwsfamily,
            name_id::WWS_SUBFAMILY => &mut meta.wwssubfamily,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value);
            found += 1;
        }
    }

    if found == 0 {
        return Err(ErrorKind::NoFontNamesFound);
    }
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_english_variants_match() {
        // United States, United Kingdom, Australia
        for lang in [0x0409, 0x0809, 0x0C09] {
            assert!(is_english(PlatformId::Windows, lang));
        }
        // German
        assert!(!is_english(PlatformId::Windows, 0x0407));
    }

    #[test]
    fn mac_english_is_language_zero() {
        assert!(is_english(PlatformId::Macintosh, 0));
        assert!(!is_english(PlatformId::Macintosh, 1));
    }

    #[test]
    fn missing_file_reports_io_error() {
        let err = font_metadata("/nonexistent/font.ttf").unwrap_err();
        assert!(matches!(err, ErrorKind::IoError(_)));
    }
}
