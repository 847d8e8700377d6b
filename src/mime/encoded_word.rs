//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Pgpmime.
//
// Pgpmime is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Pgpmime is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Pgpmime. If not, see <http://www.gnu.org/licenses/>.

use std::borrow::Cow;

/// RFC 2047 2: an encoded word may be at most 75 characters long, and a
/// header line containing one at most 76.
///
/// `=?utf-8?b?` and `?=` take 12 characters. 39 bytes of input become 52
/// characters of base64, so each word is 64 characters and the first line
/// still fits after a header name such as `Subject: `.
const MAX_CHUNK_BYTES: usize = 39;

/// Encodes `text` for use in an unstructured header such as `Subject`.
///
/// Printable ASCII text is returned unchanged. Anything else is turned into
/// a sequence of RFC 2047 "B" encoded words in UTF-8, split only on
/// character boundaries. Successive words are folded onto continuation
/// lines; decoders delete the whitespace between adjacent encoded words.
pub fn ew_encode(text: &str) -> Cow<str> {
    if text.bytes().all(|b| b' ' <= b && b <= b'~') && !text.contains("=?") {
        return Cow::Borrowed(text);
    }

    let mut words = Vec::new();
    let mut start = 0;
    for (ix, ch) in text.char_indices() {
        if ix + ch.len_utf8() - start > MAX_CHUNK_BYTES {
            words.push(encode_word(&text[start..ix]));
            start = ix;
        }
    }
    words.push(encode_word(&text[start..]));

    Cow::Owned(words.join("\r\n "))
}

fn encode_word(chunk: &str) -> String {
    format!("=?utf-8?b?{}?=", base64::encode(chunk))
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_ew_encode() {
        assert_eq!("Hello world", ew_encode("Hello world"));
        assert_eq!("=?utf-8?b?R3LDvMOfZQ==?=", ew_encode("Grüße"));
        assert_eq!("=?utf-8?b?PT9ub3Q/PQ==?=", ew_encode("=?not?="));
    }

    #[test]
    fn long_text_is_split() {
        let text = "ü".repeat(40);
        let encoded = ew_encode(&text);

        let words: Vec<&str> = encoded.split("\r\n ").collect();
        assert_eq!(3, words.len());
        for word in &words {
            assert!(word.len() <= 75, "{} is too long", word);
        }
        assert!("Subject: ".len() + words[0].len() <= 76);

        let decoded: Vec<u8> = words
            .iter()
            .flat_map(|word| {
                base64::decode(&word[10..word.len() - 2]).unwrap()
            })
            .collect();
        assert_eq!(text.as_bytes(), &decoded[..]);
    }

    proptest! {
        #[test]
        fn encoded_words_are_short(s in ".{0,200}") {
            let encoded = ew_encode(&s);
            if let Cow::Owned(ref encoded) = encoded {
                if let Some(first) = encoded.split("\r\n ").next() {
                    prop_assert!("Subject: ".len() + first.len() <= 76);
                }
                for word in encoded.split("\r\n ") {
                    prop_assert!(word.len() <= 75);
                    prop_assert!(word.starts_with("=?utf-8?b?"));
                    prop_assert!(!word.contains(' '));
                }
            }
        }
    }
}
