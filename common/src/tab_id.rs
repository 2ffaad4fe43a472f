use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one browser tab for the lifetime of its page.
///
/// Locally generated ids are 32 lowercase hex digits with UUID v4 bits.
/// Ids received from peers are taken as-is, since older tabs may use the
/// dashed form.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(String);

impl TabId {
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
        TabId(uuid.simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix used in log lines
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(idx, _)| idx)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl From<String> for TabId {
    fn from(value: String) -> Self {
        TabId(value)
    }
}

impl From<&str> for TabId {
    fn from(value: &str) -> Self {
        TabId(value.to_string())
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TabId({})", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_generated_id_is_v4_hex() {
        let mut rng = StdRng::seed_from_u64(7);
        let id = TabId::generate(&mut rng);
        let s = id.as_str();
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        // version nibble
        assert_eq!(&s[12..13], "4");
        // variant bits 10xx
        assert!(matches!(&s[16..17], "8" | "9" | "a" | "b"));
    }

    #[test]
    fn test_generated_ids_do_not_collide() {
        let mut rng = StdRng::seed_from_u64(99);
        let ids: HashSet<TabId> = (0..1_000).map(|_| TabId::generate(&mut rng)).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn test_short_prefix() {
        let id = TabId::from("0123456789abcdef");
        assert_eq!(id.short(), "01234567");
        assert_eq!(TabId::from("abc").short(), "abc");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = TabId::from("feedface");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"feedface\"");
    }
}
