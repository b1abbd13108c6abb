use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
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
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Lazy stream of normalized terms over one input text.
///
/// The stream is finite and the analysis deterministic: tokenizing the same
/// text twice yields identical term sequences. Case folding is NFKC
/// normalization followed by `str::to_lowercase`, applied once to the whole
/// input before matching.
pub struct TokenStream {
    text: String,
    pos: usize,
}

impl Iterator for TokenStream {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let m = TOKEN_RE.find_at(&self.text, self.pos)?;
            self.pos = m.end();
            let token = m.as_str();
            if STOPWORDS.contains(token) {
                continue;
            }
            return Some(STEMMER.stem(token).into_owned());
        }
    }
}

/// Analyze `text` into a term stream: NFKC + lowercase, word-character
/// matching (punctuation and whitespace never produce tokens), stopword
/// removal, English stemming. Used identically at index and query time.
pub fn tokenize(text: &str) -> TokenStream {
    TokenStream {
        text: text.nfkc().collect::<String>().to_lowercase(),
        pos: 0,
    }
}
