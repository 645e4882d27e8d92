use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;

/// Generate a random mailbox local part from English words (like happy_cloud, blue_tiger)
pub fn generate_random_username() -> String {
    let mut rng = rand::thread_rng();

    let adjectives = [
        "happy", "blue", "fast", "bright", "cool", "dark", "brave", "calm", "wise", "bold",
        "quick", "silent", "strong", "gentle", "wild", "free", "clever", "honest", "lucky",
        "mighty", "noble", "swift", "warm", "cosmic", "golden", "hidden", "magic", "rapid",
        "silver", "stellar",
    ];

    let nouns = [
        "cloud", "tiger", "river", "mountain", "ocean", "forest", "valley", "eagle", "wolf",
        "hawk", "fox", "whale", "knight", "wizard", "storm", "thunder", "star", "moon",
        "crystal", "amber", "pixel", "nexus", "arrow", "crown", "flame", "light",
    ];

    let adj = adjectives.choose(&mut rng).copied().unwrap_or("quiet");
    let noun = nouns.choose(&mut rng).copied().unwrap_or("harbor");

    // Word pairs collide quickly across runs, so a number is always appended
    let num = rng.gen_range(100..99_999);
    format!("{}_{}{}", adj, noun, num)
}

/// Random alphanumeric password containing lower case, upper case and digits
pub fn generate_password(length: usize) -> String {
    let mut rng = rand::thread_rng();

    loop {
        let candidate: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect();

        if is_mixed_alphanumeric(&candidate) {
            return candidate;
        }
    }
}

fn is_mixed_alphanumeric(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_lowercase())
        && s.chars().any(|c| c.is_ascii_uppercase())
        && s.chars().any(|c| c.is_ascii_digit())
}

/// Fake first and last name for the signup form
pub fn generate_name() -> (String, String) {
    (FirstName().fake(), LastName().fake())
}

/// Finds the target service's confirmation URL in a message body
#[derive(Debug, Clone)]
pub struct ConfirmationLinkPattern {
    regex: Regex,
}

impl ConfirmationLinkPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    /// First match in the body; the first capture group when the pattern has one
    pub fn extract(&self, body: &str) -> Option<String> {
        let captures = self.regex.captures(body)?;
        captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str().to_string())
    }
}
