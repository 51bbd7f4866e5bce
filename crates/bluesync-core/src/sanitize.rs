//! Text sanitisation for the Blue&Me head unit.
//!
//! The head unit only displays a subset of printable ASCII. Tag values are
//! pushed through a fixed pipeline before they are written:
//!
//! 1. fold known characters to ASCII replacements (umlauts, Greek, Cyrillic, `&`)
//! 2. narrow through ISO-8859-8 so anything the table missed degrades to `?`
//! 3. replace every character outside `0x20..=0x7E` with a space
//! 4. replace punctuation the display firmware cannot render with a space
//! 5. collapse runs of spaces
//! 6. cut to the maximum length
//! 7. trim
//!
//! The pipeline is total and idempotent.
//!
//! # Example
//!
//! ```rust,ignore
//! use bluesync_core::sanitize::sanitize;
//!
//! assert_eq!(sanitize("Mötley Crüe", Some(30)), "Moetley Cruee");
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use encoding_rs::ISO_8859_8;
use regex::Regex;

/// Characters the file systems of the head unit and the desktop reject.
pub const INVALID_FILE_NAME_CHARS: &str = "\\/:*?\"<>|";

/// Punctuation the head unit display cannot render.
pub const UNSUPPORTED_DISPLAY_CHARS: &str = ",;_=§$%&\\()}{]['\"`´";

/// Fold table: every character of the left-hand set maps to the right-hand
/// replacement. Earlier rows win over later ones.
const FOLD_TABLE: &[(&str, &str)] = &[
    ("äæǽ", "ae"),
    ("öœ", "oe"),
    ("ü", "ue"),
    ("Ä", "Ae"),
    ("Ü", "Ue"),
    ("Ö", "Oe"),
    ("ÀÁÂÃÄÅǺĀĂĄǍΑΆẢẠẦẪẨẬẰẮẴẲẶА", "A"),
    ("àáâãåǻāăąǎªαάảạầấẫẩậằắẵẳặа", "a"),
    ("Б", "B"),
    ("б", "b"),
    ("ÇĆĈĊČ", "C"),
    ("çćĉċč", "c"),
    ("Д", "D"),
    ("д", "d"),
    ("ÐĎĐΔ", "Dj"),
    ("ðďđδ", "dj"),
    ("ÈÉÊËĒĔĖĘĚΕΈẼẺẸỀẾỄỂỆЕЭ", "E"),
    ("èéêëēĕėęěέεẽẻẹềếễểệеэ", "e"),
    ("Ф", "F"),
    ("ф", "f"),
    ("ĜĞĠĢΓГҐ", "G"),
    ("ĝğġģγгґ", "g"),
    ("ĤĦ", "H"),
    ("ĥħ", "h"),
    ("ÌÍÎÏĨĪĬǏĮİΗΉΊΙΪỈỊИЫ", "I"),
    ("ìíîïĩīĭǐįıηήίιϊỉịиыї", "i"),
    ("Ĵ", "J"),
    ("ĵ", "j"),
    ("ĶΚК", "K"),
    ("ķκк", "k"),
    ("ĹĻĽĿŁΛЛ", "L"),
    ("ĺļľŀłλл", "l"),
    ("М", "M"),
    ("м", "m"),
    ("ÑŃŅŇΝН", "N"),
    ("ñńņňŉνн", "n"),
    ("ÒÓÔÕŌŎǑŐƠØǾΟΌΩΏỎỌỒỐỖỔỘỜỚỠỞỢО", "O"),
    ("òóôõōŏǒőơøǿºοόωώỏọồốỗổộờớỡởợо", "o"),
    ("П", "P"),
    ("п", "p"),
    ("ŔŖŘΡР", "R"),
    ("ŕŗřρр", "r"),
    ("ŚŜŞȘŠΣС", "S"),
    ("śŝşșšſσςс", "s"),
    ("ȚŢŤŦτТ", "T"),
    ("țţťŧт", "t"),
    ("ÙÚÛŨŪŬŮŰŲƯǓǕǗǙǛỦỤỪỨỮỬỰУ", "U"),
    ("ùúûũūŭůűųưǔǖǘǚǜυύϋủụừứữửựу", "u"),
    ("ÝŸŶΥΎΫỲỸỶỴЙ", "Y"),
    ("ýÿŷỳỹỷỵй", "y"),
    ("В", "V"),
    ("в", "v"),
    ("Ŵ", "W"),
    ("ŵ", "w"),
    ("ŹŻŽΖЗ", "Z"),
    ("źżžζз", "z"),
    ("ÆǼ", "AE"),
    ("ß", "ss"),
    ("Ĳ", "IJ"),
    ("ĳ", "ij"),
    ("Œ", "OE"),
    ("ƒ", "f"),
    ("ξ", "ks"),
    ("π", "p"),
    ("β", "v"),
    ("μ", "m"),
    ("ψ", "ps"),
    ("Ё", "Yo"),
    ("ё", "yo"),
    ("Є", "Ye"),
    ("є", "ye"),
    ("Ї", "Yi"),
    ("Ж", "Zh"),
    ("ж", "zh"),
    ("Х", "Kh"),
    ("х", "kh"),
    ("Ц", "Ts"),
    ("ц", "ts"),
    ("Ч", "Ch"),
    ("ч", "ch"),
    ("Ш", "Sh"),
    ("ш", "sh"),
    ("Щ", "Shch"),
    ("щ", "shch"),
    ("ЪъЬь", ""),
    ("Ю", "Yu"),
    ("ю", "yu"),
    ("Я", "Ya"),
    ("я", "ya"),
    ("&", " and "),
    (";", ":"),
    ("\\", "/"),
];

static FOLD_MAP: LazyLock<HashMap<char, &'static str>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for (sources, replacement) in FOLD_TABLE {
        for c in sources.chars() {
            map.entry(c).or_insert(*replacement);
        }
    }
    map
});

static SPACE_RUN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(" {2,}").ok());

/// Run the full sanitisation pipeline.
///
/// `max_len` counts characters of the (ASCII) result; `None` leaves the
/// length unbounded. The result is always trimmed.
#[must_use]
pub fn sanitize(text: &str, max_len: Option<usize>) -> String {
    let folded = fold(text);
    let narrowed = narrow_encoding(&folded);
    let printable = whitespace_non_printable(&narrowed);
    let supported = whitespace_unsupported(&printable);
    let mut collapsed = collapse_spaces(&supported);

    if let Some(max) = max_len {
        collapsed.truncate(max);
    }

    collapsed.trim().to_string()
}

/// Strip characters that are not allowed in file names.
///
/// Unlike [`sanitize`] this performs no transliteration.
#[must_use]
pub fn remove_invalid_file_name_chars(text: &str, also_remove_space: bool) -> String {
    text.chars()
        .filter(|c| !INVALID_FILE_NAME_CHARS.contains(*c) && !(also_remove_space && *c == ' '))
        .collect()
}

fn fold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match FOLD_MAP.get(&c) {
            Some(replacement) => out.push_str(replacement),
            None => out.push(c),
        }
    }
    out
}

/// Encode to ISO-8859-8 and read the bytes back as UTF-8. Unmappable
/// characters become `?`, high bytes become U+FFFD.
fn narrow_encoding(text: &str) -> String {
    let mut bytes = Vec::with_capacity(text.len());
    let mut buf = [0u8; 4];
    for c in text.chars() {
        let (encoded, _, had_errors) = ISO_8859_8.encode(c.encode_utf8(&mut buf));
        if had_errors {
            bytes.push(b'?');
        } else {
            bytes.extend_from_slice(&encoded);
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn whitespace_non_printable(text: &str) -> String {
    text.chars()
        .map(|c| if (' '..='~').contains(&c) { c } else { ' ' })
        .collect()
}

fn whitespace_unsupported(text: &str) -> String {
    text.chars()
        .map(|c| if UNSUPPORTED_DISPLAY_CHARS.contains(c) { ' ' } else { c })
        .collect()
}

fn collapse_spaces(text: &str) -> String {
    SPACE_RUN.as_ref().map_or_else(
        || text.to_string(),
        |re| re.replace_all(text, " ").into_owned(),
    )
}
