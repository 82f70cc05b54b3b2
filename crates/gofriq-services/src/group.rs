//! Token-to-group resolution and access gating.
//!
//! Bearer tokens are HS256 JWTs whose `groups` claim lists group names.
//! Multiple tokens union their groups. Anonymous callers resolve to the
//! reserved `public` group only. Group ids are derived deterministically
//! from names (UUID v5), so every component agrees on the id of a group
//! without a shared catalog.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use gofriq::models::{ADMIN_GROUP, PUBLIC_GROUP};
use gofriq::{Error, Result};

/// JWT claims the auth collaborator issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    pub exp: usize,
}

/// Resolves bearer tokens to permitted groups.
#[derive(Clone)]
pub struct GroupService {
    decoding_key: Option<DecodingKey>,
}

impl GroupService {
    /// Service verifying tokens against the given HS256 secret. With no
    /// secret, every caller is anonymous.
    #[must_use]
    pub fn new(jwt_secret: Option<&str>) -> Self {
        Self {
            decoding_key: jwt_secret
                .filter(|s| !s.is_empty())
                .map(|s| DecodingKey::from_secret(s.as_bytes())),
        }
    }

    /// Deterministic group id for a group name.
    #[must_use]
    pub fn group_uuid(name: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.trim().to_lowercase().as_bytes())
    }

    /// Map group names to their ids.
    #[must_use]
    pub fn get_group_uuids_by_names(names: &[String]) -> Vec<Uuid> {
        names.iter().map(|n| Self::group_uuid(n)).collect()
    }

    fn decode_token(&self, token: &str) -> Option<TokenClaims> {
        let key = self.decoding_key.as_ref()?;
        match decode::<TokenClaims>(token, key, &Validation::new(Algorithm::HS256)) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::warn!(error = %e, "rejected bearer token");
                None
            }
        }
    }

    /// Union the group names of every valid token. Anonymous callers (no
    /// tokens, or none valid) get `public` only; `public` is always
    /// included.
    #[must_use]
    pub fn resolve_permitted_groups(&self, tokens: &[String]) -> Vec<String> {
        let mut groups: Vec<String> = Vec::new();
        for token in tokens {
            if let Some(claims) = self.decode_token(token) {
                for group in claims.groups {
                    let group = group.trim().to_lowercase();
                    if !group.is_empty() && !groups.contains(&group) {
                        groups.push(group);
                    }
                }
            }
        }
        let public = PUBLIC_GROUP.to_string();
        if !groups.contains(&public) {
            groups.push(public);
        }
        groups
    }

    /// Permitted group ids for a caller.
    #[must_use]
    pub fn resolve_permitted_group_ids(&self, tokens: &[String]) -> Vec<Uuid> {
        Self::get_group_uuids_by_names(&self.resolve_permitted_groups(tokens))
    }

    /// The group new content is written into: the first permitted group
    /// that is not `public`; admins fall back to the `admin` group;
    /// everyone else is rejected.
    pub fn resolve_write_group(&self, tokens: &[String]) -> Result<(String, Uuid)> {
        let groups = self.resolve_permitted_groups(tokens);
        if let Some(group) = groups.iter().find(|g| *g != PUBLIC_GROUP && *g != ADMIN_GROUP) {
            return Ok((group.clone(), Self::group_uuid(group)));
        }
        if groups.iter().any(|g| g == ADMIN_GROUP) {
            return Ok((ADMIN_GROUP.to_string(), Self::group_uuid(ADMIN_GROUP)));
        }
        Err(Error::AuthRequired(
            "no writable group; supply a token carrying a non-public group".to_string(),
        ))
    }

    /// Whether any token carries the `admin` group.
    #[must_use]
    pub fn is_admin(&self, tokens: &[String]) -> bool {
        self.resolve_permitted_groups(tokens).iter().any(|g| g == ADMIN_GROUP)
    }

    /// Gate an admin-only operation.
    pub fn require_admin(&self, tokens: &[String]) -> Result<()> {
        if self.is_admin(tokens) {
            Ok(())
        } else {
            Err(Error::AdminRequired("operation requires the admin group".to_string()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token(groups: &[&str]) -> String {
        let claims = TokenClaims {
            sub: Some("tester".to_string()),
            groups: groups.iter().map(|g| (*g).to_string()).collect(),
            exp: usize::MAX,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes()))
            .unwrap()
    }

    fn service() -> GroupService {
        GroupService::new(Some(SECRET))
    }

    #[test]
    fn test_anonymous_gets_public_only() {
        let groups = service().resolve_permitted_groups(&[]);
        assert_eq!(groups, vec![PUBLIC_GROUP.to_string()]);
    }

    #[test]
    fn test_invalid_token_is_anonymous() {
        let groups = service().resolve_permitted_groups(&["not.a.jwt".to_string()]);
        assert_eq!(groups, vec![PUBLIC_GROUP.to_string()]);
    }

    #[test]
    fn test_no_secret_means_anonymous() {
        let service = GroupService::new(None);
        let groups = service.resolve_permitted_groups(&[token(&["apac"])]);
        assert_eq!(groups, vec![PUBLIC_GROUP.to_string()]);
    }

    #[test]
    fn test_multiple_tokens_union() {
        let groups = service()
            .resolve_permitted_groups(&[token(&["apac"]), token(&["emea", "apac"])]);
        assert!(groups.contains(&"apac".to_string()));
        assert!(groups.contains(&"emea".to_string()));
        assert!(groups.contains(&PUBLIC_GROUP.to_string()));
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn test_write_group_first_non_public() {
        let (name, id) = service().resolve_write_group(&[token(&["apac", "emea"])]).unwrap();
        assert_eq!(name, "apac");
        assert_eq!(id, GroupService::group_uuid("apac"));
    }

    #[test]
    fn test_write_group_admin_fallback() {
        let (name, _) = service().resolve_write_group(&[token(&["admin"])]).unwrap();
        assert_eq!(name, ADMIN_GROUP);
    }

    #[test]
    fn test_write_group_rejected_for_public_only() {
        let err = service().resolve_write_group(&[]).unwrap_err();
        assert!(matches!(err, Error::AuthRequired(_)));
    }

    #[test]
    fn test_admin_gate() {
        let service = service();
        assert!(service.is_admin(&[token(&["admin", "apac"])]));
        assert!(!service.is_admin(&[token(&["apac"])]));
        assert!(service.require_admin(&[token(&["admin"])]).is_ok());
        assert!(matches!(
            service.require_admin(&[token(&["apac"])]),
            Err(Error::AdminRequired(_))
        ));
    }

    #[test]
    fn test_group_uuid_deterministic() {
        assert_eq!(GroupService::group_uuid("apac"), GroupService::group_uuid("APAC "));
        assert_ne!(GroupService::group_uuid("apac"), GroupService::group_uuid("emea"));
    }
}
