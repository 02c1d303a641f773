//! Domain values decoded from raw header integers: 1904-epoch timestamps,
//! 3x3 fixed-point transform matrices and packed language codes.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("timestamp {0} overflows the date range")]
    TimestampOverflow(u64),
    #[error("language code {0:#06x} has the high bit set")]
    LanguageHighBit(u16),
    #[error("language code {0} is not a defined Macintosh language")]
    UnknownMacLanguage(u16),
    #[error("language code {0:#06x} does not pack three lowercase letters")]
    LanguageNotLetters(u16),
}

/// An instant stored as seconds since 1904-01-01T00:00:00Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub raw: u64,
    pub date: DateTime<Utc>,
}

/// Seconds from 1904-01-01T00:00:00Z to the Unix epoch.
const MAC_EPOCH_OFFSET: i64 = 2_082_844_800;

impl Timestamp {
    pub fn from_raw(raw: u64) -> Result<Self, ValueError> {
        let date = i64::try_from(raw)
            .ok()
            .and_then(|secs| secs.checked_sub(MAC_EPOCH_OFFSET))
            .and_then(|unix| DateTime::from_timestamp(unix, 0))
            .ok_or(ValueError::TimestampOverflow(raw))?;
        Ok(Timestamp { raw, date })
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date.format("%Y-%m-%dT%H:%M:%S%z"))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.date.to_rfc3339())
    }
}

/// Transform matrix stored on disk as `a b u c d v x y w`.
///
/// `u`, `v`, `w` are 2.30 fixed point, everything else 16.16.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Matrix {
    pub raw: [u32; 9],
    pub a: f64,
    pub b: f64,
    pub u: f64,
    pub c: f64,
    pub d: f64,
    pub v: f64,
    pub x: f64,
    pub y: f64,
    pub w: f64,
}

const FIXED_16_16: f64 = (1u64 << 16) as f64;
const FIXED_2_30: f64 = (1u64 << 30) as f64;

impl Matrix {
    pub fn from_raw(raw: [u32; 9]) -> Self {
        // fixed-point values are signed
        let f16 = |i: usize| raw[i] as i32 as f64 / FIXED_16_16;
        let f30 = |i: usize| raw[i] as i32 as f64 / FIXED_2_30;
        Matrix {
            raw,
            a: f16(0),
            b: f16(1),
            u: f30(2),
            c: f16(3),
            d: f16(4),
            v: f30(5),
            x: f16(6),
            y: f16(7),
            w: f30(8),
        }
    }

    /// Rows in `[[a, b, u], [c, d, v], [x, y, w]]` form.
    pub fn rows(&self) -> [[f64; 3]; 3] {
        [
            [self.a, self.b, self.u],
            [self.c, self.d, self.v],
            [self.x, self.y, self.w],
        ]
    }

    pub fn is_identity(&self) -> bool {
        self.rows() == [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.rows();
        write!(
            f,
            "[[{} {} {}] [{} {} {}] [{} {} {}]]",
            r[0][0], r[0][1], r[0][2], r[1][0], r[1][1], r[1][2], r[2][0], r[2][1], r[2][2]
        )
    }
}

/// Decoded 16-bit language field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Language {
    Unspecified,
    /// Index into the historical Macintosh language table.
    Macintosh { code: u16, name: &'static str },
    /// Three letters packed as 5-bit fields.
    Packed(String),
}

const UNSPECIFIED_LANGUAGE: u16 = 0x7FFF;
const MAC_LANGUAGE_LIMIT: u16 = 0x400;

impl Language {
    pub fn from_raw(raw: u16) -> Result<Self, ValueError> {
        if raw > UNSPECIFIED_LANGUAGE {
            return Err(ValueError::LanguageHighBit(raw));
        }
        if raw == UNSPECIFIED_LANGUAGE {
            return Ok(Language::Unspecified);
        }
        if raw < MAC_LANGUAGE_LIMIT {
            return MAC_LANGUAGES
                .get(raw as usize)
                .copied()
                .flatten()
                .map(|name| Language::Macintosh { code: raw, name })
                .ok_or(ValueError::UnknownMacLanguage(raw));
        }
        let fields = [(raw >> 10) & 0x1F, (raw >> 5) & 0x1F, raw & 0x1F];
        // 1..=26 maps onto 'a'..='z'
        if fields.iter().any(|&c| !(1..=26).contains(&c)) {
            return Err(ValueError::LanguageNotLetters(raw));
        }
        let code = fields.iter().map(|&c| (c as u8 + 0x60) as char).collect();
        Ok(Language::Packed(code))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Unspecified => write!(f, "unspecified"),
            Language::Macintosh { name, .. } => write!(f, "{}", name),
            Language::Packed(code) => write!(f, "{}", code),
        }
    }
}

impl Serialize for Language {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// QuickTime Macintosh language codes 0..=129; 95..=127 are unassigned.
static MAC_LANGUAGES: [Option<&str>; 130] = {
    let mut t: [Option<&str>; 130] = [None; 130];
    t[0] = Some("English");
    t[1] = Some("French");
    t[2] = Some("German");
    t[3] = Some("Italian");
    t[4] = Some("Dutch");
    t[5] = Some("Swedish");
    t[6] = Some("Spanish");
    t[7] = Some("Danish");
    t[8] = Some("Portuguese");
    t[9] = Some("Norwegian");
    t[10] = Some("Hebrew");
    t[11] = Some("Japanese");
    t[12] = Some("Arabic");
    t[13] = Some("Finnish");
    t[14] = Some("Greek");
    t[15] = Some("Icelandic");
    t[16] = Some("Maltese");
    t[17] = Some("Turkish");
    t[18] = Some("Croatian");
    t[19] = Some("Traditional Chinese");
    t[20] = Some("Urdu");
    t[21] = Some("Hindi");
    t[22] = Some("Thai");
    t[23] = Some("Korean");
    t[24] = Some("Lithuanian");
    t[25] = Some("Polish");
    t[26] = Some("Hungarian");
    t[27] = Some("Estonian");
    t[28] = Some("Latvian");
    t[29] = Some("Saami");
    t[30] = Some("Faroese");
    t[31] = Some("Farsi");
    t[32] = Some("Russian");
    t[33] = Some("Simplified Chinese");
    t[34] = Some("Flemish");
    t[35] = Some("Irish");
    t[36] = Some("Albanian");
    t[37] = Some("Romanian");
    t[38] = Some("Czech");
    t[39] = Some("Slovak");
    t[40] = Some("Slovenian");
    t[41] = Some("Yiddish");
    t[42] = Some("Serbian");
    t[43] = Some("Macedonian");
    t[44] = Some("Bulgarian");
    t[45] = Some("Ukrainian");
    t[46] = Some("Belarusian");
    t[47] = Some("Uzbek");
    t[48] = Some("Kazakh");
    t[49] = Some("Azerbaijani");
    t[50] = Some("Azerbaijani (Arabic)");
    t[51] = Some("Armenian");
    t[52] = Some("Georgian");
    t[53] = Some("Moldavian");
    t[54] = Some("Kirghiz");
    t[55] = Some("Tajiki");
    t[56] = Some("Turkmen");
    t[57] = Some("Mongolian");
    t[58] = Some("Mongolian (Cyrillic)");
    t[59] = Some("Pashto");
    t[60] = Some("Kurdish");
    t[61] = Some("Kashmiri");
    t[62] = Some("Sindhi");
    t[63] = Some("Tibetan");
    t[64] = Some("Nepali");
    t[65] = Some("Sanskrit");
    t[66] = Some("Marathi");
    t[67] = Some("Bengali");
    t[68] = Some("Assamese");
    t[69] = Some("Gujarati");
    t[70] = Some("Punjabi");
    t[71] = Some("Oriya");
    t[72] = Some("Malayalam");
    t[73] = Some("Kannada");
    t[74] = Some("Tamil");
    t[75] = Some("Telugu");
    t[76] = Some("Sinhala");
    t[77] = Some("Burmese");
    t[78] = Some("Khmer");
    t[79] = Some("Lao");
    t[80] = Some("Vietnamese");
    t[81] = Some("Indonesian");
    t[82] = Some("Tagalog");
    t[83] = Some("Malay (Roman)");
    t[84] = Some("Malay (Arabic)");
    t[85] = Some("Amharic");
    t[86] = Some("Tigrinya");
    t[87] = Some("Galla");
    t[88] = Some("Somali");
    t[89] = Some("Swahili");
    t[90] = Some("Kinyarwanda");
    t[91] = Some("Rundi");
    t[92] = Some("Nyanja");
    t[93] = Some("Malagasy");
    t[94] = Some("Esperanto");
    t[128] = Some("Welsh");
    t[129] = Some("Basque");
    t
};
