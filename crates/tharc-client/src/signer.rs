//! WBI request signing.
//!
//! Signed endpoints expect a `wts` timestamp and a `w_rid` digest computed
//! from the sorted, cleaned query string and a "mixin key" derived from two
//! rotating keys published by the nav endpoint.

use std::collections::BTreeMap;

/// Index permutation that turns `img_key + sub_key` into the mixin key.
const MIXIN_KEY_ENC_TAB: [usize; 64] = [
    46, 47, 18, 2, 53, 8, 23, 32, 15, 50, 10, 31, 58, 3, 45, 35, 27, 43, 5, 49,
    33, 9, 42, 19, 29, 28, 14, 39, 12, 38, 41, 13, 37, 48, 7, 16, 24, 55, 40,
    61, 26, 17, 0, 1, 60, 51, 30, 4, 22, 25, 54, 21, 56, 59, 6, 63, 57, 62, 11,
    36, 20, 34, 44, 52,
];

/// Characters stripped from every parameter value before encoding.
const STRIPPED: &str = "!'()*";

/// The two-part WBI secret parsed out of the nav response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WbiKeys {
    pub img_key: String,
    pub sub_key: String,
}

impl WbiKeys {
    /// Scrambles the concatenated keys through the permutation table and
    /// truncates to 32 characters.
    pub fn mixin_key(&self) -> String {
        let source: Vec<char> = format!("{}{}", self.img_key, self.sub_key).chars().collect();
        MIXIN_KEY_ENC_TAB
            .iter()
            .filter_map(|&i| source.get(i))
            .take(32)
            .collect()
    }
}

/// Extracts a key from one of the nav URLs: the basename without extension.
pub fn key_from_url(url: &str) -> Option<&str> {
    url.rsplit('/').next()?.split('.').next()
}

/// Signs a parameter map for a given `wts` (unix seconds).
///
/// Returns the cleaned parameters in canonical order with `wts` and `w_rid`
/// appended. The input map is consumed; signing is deterministic for fixed
/// keys, parameters and `wts`.
pub fn sign(
    params: BTreeMap<String, String>,
    keys: &WbiKeys,
    wts: i64,
) -> Vec<(String, String)> {
    let mixin_key = keys.mixin_key();

    let mut params = params;
    params.insert("wts".to_string(), wts.to_string());

    // BTreeMap iteration is already sorted by key code points.
    let cleaned: Vec<(String, String)> = params
        .into_iter()
        .map(|(k, v)| (k, v.chars().filter(|c| !STRIPPED.contains(*c)).collect()))
        .collect();

    let query = cleaned
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let w_rid = format!("{:x}", md5::compute(format!("{query}{mixin_key}")));

    let mut signed = cleaned;
    signed.push(("w_rid".to_string(), w_rid));
    signed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> WbiKeys {
        WbiKeys {
            img_key: "7cd084941338484aae1ad9425b84077c".to_string(),
            sub_key: "4932caff0ff746eab6f01bf08b70ac45".to_string(),
        }
    }

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn mixin_key_permutation() {
        assert_eq!(keys().mixin_key(), "ea1db124af3c7062474693fa704f4ff8");
    }

    #[test]
    fn key_from_url_takes_basename_stem() {
        assert_eq!(
            key_from_url("https://i0.hdslb.com/bfs/wbi/7cd084941338484aae1ad9425b84077c.png"),
            Some("7cd084941338484aae1ad9425b84077c")
        );
        assert_eq!(key_from_url("abc.png"), Some("abc"));
    }

    #[test]
    fn signature_is_deterministic() {
        let signed = sign(
            params(&[("mid", "12345"), ("pn", "1"), ("ps", "50")]),
            &keys(),
            1_700_000_000,
        );
        assert_eq!(
            signed,
            vec![
                ("mid".to_string(), "12345".to_string()),
                ("pn".to_string(), "1".to_string()),
                ("ps".to_string(), "50".to_string()),
                ("wts".to_string(), "1700000000".to_string()),
                (
                    "w_rid".to_string(),
                    "3c88c3e204b9b24a8f446512f528b622".to_string()
                ),
            ]
        );
    }

    #[test]
    fn values_are_cleaned_and_encoded() {
        let signed = sign(
            params(&[("mid", "283*"), ("search", "a!b'c(d)e*f"), ("kw", "東方")]),
            &keys(),
            1_700_000_000,
        );
        let w_rid = signed
            .iter()
            .find(|(k, _)| k == "w_rid")
            .map(|(_, v)| v.as_str());
        assert_eq!(
            signed.iter().find(|(k, _)| k == "mid").map(|(_, v)| v.as_str()),
            Some("283")
        );
        assert_eq!(
            signed
                .iter()
                .find(|(k, _)| k == "search")
                .map(|(_, v)| v.as_str()),
            Some("abcdef")
        );
        assert_eq!(w_rid, Some("b5024b88a90f4357b89bf2a70adc58f9"));
    }
}
