//! Title grammar: the 40-ish byte string that carries direction,
//! request-id, chunk number, total, and unit type for one line of a
//! packed snippet.
//!
//! Exact format: `<dir><request_id>:<chunk:5 digits>/<total:5 digits>:<type>`,
//! e.g. `>17310452918c4a1:00003/00000:DATA`. Parsing uses the anchored
//! regex below; titles that don't match are silently skipped by callers —
//! this is the only cross-version compatibility hook.

use std::fmt;

use once_cell_regex::TITLE_RE;
use rand::Rng;

use crate::error::TitleError;

/// `>` (client→worker) or `<` (worker→client).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    ClientToWorker,
    WorkerToClient,
}

impl Direction {
    pub fn marker(self) -> char {
        match self {
            Direction::ClientToWorker => '>',
            Direction::WorkerToClient => '<',
        }
    }

    pub fn from_marker(c: char) -> Option<Self> {
        match c {
            '>' => Some(Direction::ClientToWorker),
            '<' => Some(Direction::WorkerToClient),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::ClientToWorker => Direction::WorkerToClient,
            Direction::WorkerToClient => Direction::ClientToWorker,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.marker())
    }
}

/// `DATA` (stream chunk), `RQST` (complete request blob), `RESP` (complete
/// response blob).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitType {
    Data,
    Rqst,
    Resp,
}

impl UnitType {
    fn as_str(self) -> &'static str {
        match self {
            UnitType::Data => "DATA",
            UnitType::Rqst => "RQST",
            UnitType::Resp => "RESP",
        }
    }

    fn parse(s: &str) -> Result<Self, TitleError> {
        match s {
            "DATA" => Ok(UnitType::Data),
            "RQST" => Ok(UnitType::Rqst),
            "RESP" => Ok(UnitType::Resp),
            other => Err(TitleError::UnknownUnitType(other.to_string())),
        }
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A 16-character request id: 13-digit unix-millisecond timestamp prefix
/// plus 3 random hex digits. Doubles as a creation timestamp for the stale
/// reaper.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Mint a fresh request id from the current wall-clock time.
    pub fn new(now_ms: u128) -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..3)
            .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap())
            .collect();
        Self(format!("{now_ms:013}{suffix}"))
    }

    /// Parse from an existing 16-character string (e.g. off the wire).
    pub fn from_string(s: impl Into<String>) -> Result<Self, TitleError> {
        let s = s.into();
        if s.len() != 16 {
            return Err(TitleError::BadRequestIdLength(s.len()));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The embedded unix-millisecond creation timestamp, used by the stale
    /// reaper. Returns `None` if the first 13 characters aren't digits
    /// (malformed / foreign request id).
    pub fn created_at_ms(&self) -> Option<u128> {
        self.0.get(..13)?.parse().ok()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fully parsed/constructed title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Title {
    pub direction: Direction,
    pub request_id: RequestId,
    pub chunk: u32,
    pub total: u32,
    pub unit_type: UnitType,
}

impl Title {
    pub fn format(&self) -> String {
        format!(
            "{}{}:{:05}/{:05}:{}",
            self.direction.marker(),
            self.request_id,
            self.chunk,
            self.total,
            self.unit_type
        )
    }

    pub fn parse(s: &str) -> Result<Self, TitleError> {
        let caps = TITLE_RE
            .captures(s)
            .ok_or_else(|| TitleError::Malformed(s.to_string()))?;

        let direction = Direction::from_marker(caps[1].chars().next().unwrap())
            .ok_or_else(|| TitleError::Malformed(s.to_string()))?;
        let request_id = RequestId::from_string(caps[2].to_string())?;
        let chunk: u32 = caps[3]
            .parse()
            .map_err(|_| TitleError::Malformed(s.to_string()))?;
        let total: u32 = caps[4]
            .parse()
            .map_err(|_| TitleError::Malformed(s.to_string()))?;
        let unit_type = UnitType::parse(&caps[5])?;

        Ok(Title {
            direction,
            request_id,
            chunk,
            total,
            unit_type,
        })
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

mod once_cell_regex {
    use regex::Regex;
    use std::sync::OnceLock;

    static TITLE: OnceLock<Regex> = OnceLock::new();

    pub struct LazyTitleRe;

    impl std::ops::Deref for LazyTitleRe {
        type Target = Regex;
        fn deref(&self) -> &Regex {
            TITLE.get_or_init(|| {
                Regex::new(r"^([<>])(.{16}):(\d{5})/(\d{5}):(\w{4})$").expect("valid title regex")
            })
        }
    }

    pub static TITLE_RE: LazyTitleRe = LazyTitleRe;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request_id() -> RequestId {
        RequestId::from_string("1731045291812c45").unwrap()
    }

    #[test]
    fn title_roundtrips_through_format_and_parse() {
        let title = Title {
            direction: Direction::ClientToWorker,
            request_id: sample_request_id(),
            chunk: 3,
            total: 0,
            unit_type: UnitType::Data,
        };
        let formatted = title.format();
        assert_eq!(Title::parse(&formatted).unwrap(), title);
    }

    #[test]
    fn title_format_matches_exact_grammar() {
        let title = Title {
            direction: Direction::WorkerToClient,
            request_id: sample_request_id(),
            chunk: 1,
            total: 1,
            unit_type: UnitType::Rqst,
        };
        assert_eq!(title.format(), "<1731045291812c45:00001/00001:RQST");
    }

    #[test]
    fn malformed_titles_are_rejected() {
        assert!(Title::parse("not a title").is_err());
        assert!(Title::parse(">tooshort:00001/00000:DATA").is_err());
        assert!(Title::parse("?1731045291812c45:00001/00000:DATA").is_err());
        assert!(Title::parse("<1731045291812c45:0001/00000:DATA").is_err());
        assert!(Title::parse("<1731045291812c45:00001/00000:XX").is_err());
    }

    #[test]
    fn request_id_rejects_wrong_length() {
        assert!(RequestId::from_string("short").is_err());
        assert!(RequestId::from_string("this-id-is-way-too-long-for-the-grammar").is_err());
    }

    #[test]
    fn request_id_exposes_embedded_timestamp() {
        let id = RequestId::from_string("1731045291812c45").unwrap();
        assert_eq!(id.created_at_ms(), Some(1731045291812));
    }

    #[test]
    fn request_id_new_embeds_given_timestamp() {
        let id = RequestId::new(1700000000000);
        assert_eq!(id.created_at_ms(), Some(1700000000000));
        assert_eq!(id.as_str().len(), 16);
    }

    #[test]
    fn direction_marker_roundtrips() {
        assert_eq!(Direction::from_marker('>'), Some(Direction::ClientToWorker));
        assert_eq!(Direction::from_marker('<'), Some(Direction::WorkerToClient));
        assert_eq!(Direction::from_marker('x'), None);
        assert_eq!(Direction::ClientToWorker.opposite(), Direction::WorkerToClient);
    }
}
