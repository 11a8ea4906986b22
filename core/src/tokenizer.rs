use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very","via",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","within","without","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

/// Stem a single normalized token with the same stemmer used for indexing,
/// so query-side expansion aligns with indexed postings.
pub fn stem(token: &str) -> String {
    STEMMER.stem(token).to_string()
}

/// Tokenize field text into (term, position) using NFKC normalization,
/// lowercasing, stopword removal, and stemming.
///
/// Positions are the 0-based ordinal of each word match, counted before
/// stopword removal, so a stopword between two terms breaks phrase
/// contiguity. Unknown markup either matches as literal words or is
/// dropped by the word pattern; it never fails.
pub fn tokenize(text: &str) -> Vec<(String, u32)> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    let mut tokens = Vec::new();
    for (pos, mat) in RE.find_iter(&normalized).enumerate() {
        let token = mat.as_str();
        if is_stopword(token) {
            continue;
        }
        tokens.push((stem(token), pos as u32));
    }
    tokens
}

/// Tokenize without stopword removal or stemming: normalized lowercase
/// words with their ordinal positions. The query processor uses this
/// stream for main-term heuristics and exact-phrase detection, where the
/// literal word forms matter.
pub fn tokenize_raw(text: &str) -> Vec<(String, u32)> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    RE.find_iter(&normalized)
        .enumerate()
        .map(|(pos, mat)| (mat.as_str().to_string(), pos as u32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Running, runner's run!");
        assert!(t.iter().any(|(w, _)| w == "run"));
    }

    #[test]
    fn positions_count_stopwords() {
        let t = tokenize("personal finance and money tips");
        // "and" occupies position 2, so "money" sits at 3.
        assert_eq!(
            t,
            vec![
                ("person".into(), 0),
                ("financ".into(), 1),
                ("money".into(), 3),
                ("tip".into(), 4)
            ]
        );
    }

    #[test]
    fn raw_keeps_stopwords_unstemmed() {
        let t = tokenize_raw("The running dogs");
        let words: Vec<&str> = t.iter().map(|(w, _)| w.as_str()).collect();
        assert_eq!(words, vec!["the", "running", "dogs"]);
    }

    #[test]
    fn markup_is_tolerated() {
        let t = tokenize("<div class=\"post\">finance &amp; savings</div>");
        assert!(t.iter().any(|(w, _)| w == "financ"));
        assert!(t.iter().any(|(w, _)| w == "save"));
    }
}
