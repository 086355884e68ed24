//! Content digests: `<algorithm>:<hex>` identifiers computed from blob bytes.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use sha2::Digest as _;

static ALGORITHM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:[+._-][a-z0-9]+)*$").expect("valid regex"));

/// A digest function the registry can compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// SHA-256, the algorithm used for all content the registry writes.
    Sha256,
}

impl Algorithm {
    /// The name used in digest strings and blob paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
        }
    }

    /// Length of the hex encoded output.
    pub fn hex_len(&self) -> usize {
        match self {
            Algorithm::Sha256 => 64,
        }
    }

    /// A fresh incremental hasher for this algorithm.
    pub fn hasher(&self) -> DigestHasher {
        let state = match self {
            Algorithm::Sha256 => HasherState::Sha256(sha2::Sha256::new()),
        };
        DigestHasher {
            algorithm: *self,
            state,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// No implementation is available for the named digest algorithm.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported digest algorithm: {0}")]
pub struct UnsupportedAlgorithm(pub String);

impl FromStr for Algorithm {
    type Err = UnsupportedAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(Algorithm::Sha256),
            other => Err(UnsupportedAlgorithm(other.to_owned())),
        }
    }
}

/// A link (or digest string) which is not of the form `<algorithm>:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed digest {input:?}: {reason}")]
pub struct MalformedLink {
    input: String,
    reason: &'static str,
}

impl MalformedLink {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_owned(),
            reason,
        }
    }

    pub(crate) fn not_utf8(lossy: &str) -> Self {
        Self::new(lossy, "not valid UTF-8")
    }

    /// The text which failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

/// Identifies content by algorithm and hex encoded hash.
///
/// The string form `<algorithm>:<hex>` is what link files contain and what
/// manifests reference. Digests order by algorithm name, then by hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    algorithm: String,
    hex: String,
}

impl Digest {
    /// Build a digest from its two parts, checking that each is well formed.
    ///
    /// The hex length is not checked against the algorithm.
    pub fn new(algorithm: &str, hex: &str) -> Result<Self, MalformedLink> {
        if !ALGORITHM.is_match(algorithm) {
            return Err(MalformedLink::new(algorithm, "invalid algorithm name"));
        }

        let valid_hex =
            !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid_hex {
            return Err(MalformedLink::new(hex, "digest is not lowercase hex"));
        }

        Ok(Self {
            algorithm: algorithm.to_owned(),
            hex: hex.to_owned(),
        })
    }

    /// A SHA-256 digest from its hex encoding.
    pub fn sha256(hex: &str) -> Result<Self, MalformedLink> {
        Self::new(Algorithm::Sha256.as_str(), hex)
    }

    /// Compute the digest of `bytes`.
    pub fn from_bytes(algorithm: Algorithm, bytes: &[u8]) -> Self {
        let mut hasher = algorithm.hasher();
        hasher.update(bytes);
        hasher.finalize()
    }

    /// Parse the contents of a link file.
    ///
    /// Trailing whitespace is ignored. The remainder must split on `:` into
    /// exactly two non-empty parts.
    pub fn parse(link: &str) -> Result<Self, MalformedLink> {
        let link = link.trim_end();
        let mut parts = link.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(algorithm), Some(hex), None) => {
                Self::new(algorithm, hex).map_err(|err| MalformedLink::new(link, err.reason))
            }
            _ => Err(MalformedLink::new(
                link,
                "expected two parts separated by `:`",
            )),
        }
    }

    /// The algorithm name, e.g. `sha256`.
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// The hex encoded hash.
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Whether the algorithm is one this registry implements and the hex has
    /// the length that algorithm produces.
    pub fn is_canonical(&self) -> bool {
        self.algorithm
            .parse::<Algorithm>()
            .is_ok_and(|algorithm| algorithm.hex_len() == self.hex.len())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl FromStr for Digest {
    type Err = MalformedLink;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Digest::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = MalformedLink;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Digest::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(value: Digest) -> Self {
        value.to_string()
    }
}

#[derive(Clone)]
enum HasherState {
    Sha256(sha2::Sha256),
}

/// Running hash over a stream of chunks.
#[derive(Clone)]
pub struct DigestHasher {
    algorithm: Algorithm,
    state: HasherState,
}

impl fmt::Debug for DigestHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestHasher")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl DigestHasher {
    /// Feed the next chunk.
    pub fn update(&mut self, chunk: &[u8]) {
        match &mut self.state {
            HasherState::Sha256(hasher) => hasher.update(chunk),
        }
    }

    /// The digest of everything fed so far.
    pub fn finalize(self) -> Digest {
        let hex = match self.state {
            HasherState::Sha256(hasher) => hex::encode(hasher.finalize()),
        };
        Digest {
            algorithm: self.algorithm.as_str().to_owned(),
            hex,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BYTES_0123: &str = "054edec1d0211f624fed0cbca9d4f9400b0e491c43742af2c5b0abebf0c990d8";

    #[test]
    fn sha256_of_bytes() {
        let digest = Digest::from_bytes(Algorithm::Sha256, &[0x00, 0x01, 0x02, 0x03]);
        assert_eq!(digest.algorithm(), "sha256");
        assert_eq!(digest.hex(), BYTES_0123);
        assert!(digest.is_canonical());
    }

    #[test]
    fn sha256_of_empty_input() {
        let digest = Digest::from_bytes(Algorithm::Sha256, b"");
        assert_eq!(
            digest.to_string(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn incremental_matches_one_shot() {
        let data: Vec<u8> = (0..=255).cycle().take(10_000).collect();
        let mut hasher = Algorithm::Sha256.hasher();
        for chunk in data.chunks(333) {
            hasher.update(chunk);
        }
        assert_eq!(
            hasher.finalize(),
            Digest::from_bytes(Algorithm::Sha256, &data)
        );
    }

    #[test]
    fn parse_link() {
        let digest = Digest::parse("sha256:1234").unwrap();
        assert_eq!(digest.algorithm(), "sha256");
        assert_eq!(digest.hex(), "1234");
        assert!(!digest.is_canonical());
        assert_eq!(Digest::sha256("1234").unwrap(), digest);
    }

    #[test]
    fn parse_ignores_trailing_newline() {
        let digest = Digest::parse("sha256:abcd\n").unwrap();
        assert_eq!(digest.to_string(), "sha256:abcd");
    }

    #[test]
    fn parse_rejects_malformed_links() {
        for link in [
            "asd",
            "",
            "sha256:",
            ":abcd",
            "sha256:ab:cd",
            "sha256:zz",
            "sha256:ABCD",
            "sha/256:ab",
            "..:ab",
            ".:ab",
            "sha256.:ab",
            "sha..256:ab",
        ] {
            let err = Digest::parse(link).unwrap_err();
            assert_eq!(err.input(), link.trim_end(), "{link}");
        }
    }

    #[test]
    fn orders_by_algorithm_then_hex() {
        let short = Digest::new("sha", "ff").unwrap();
        let long = Digest::new("sha256", "00").unwrap();
        assert!(short < long);
        assert!(Digest::sha256("00").unwrap() < Digest::sha256("01").unwrap());
    }

    #[test]
    fn display_round_trips_through_parse() {
        let digest = Digest::from_bytes(Algorithm::Sha256, b"manifest");
        let text = digest.to_string();
        assert_eq!(text.parse::<Digest>().unwrap(), digest);
    }

    #[test]
    fn serde_uses_string_form() {
        let digest: Digest = serde_json::from_str("\"sha256:00ff\"").unwrap();
        assert_eq!(digest.hex(), "00ff");
        assert_eq!(serde_json::to_string(&digest).unwrap(), "\"sha256:00ff\"");

        assert!(serde_json::from_str::<Digest>("\"nope\"").is_err());
    }

    #[test]
    fn unsupported_algorithm() {
        assert_eq!("sha256".parse::<Algorithm>().unwrap(), Algorithm::Sha256);
        let err = "sha512".parse::<Algorithm>().unwrap_err();
        assert_eq!(err, UnsupportedAlgorithm("sha512".into()));
        assert_eq!(err.to_string(), "unsupported digest algorithm: sha512");
    }
}
