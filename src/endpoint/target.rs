use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::sync::Lazy;

use super::registry::Registry;
use super::{Endpoint, EndpointKind, InstanceRef, Result};
use crate::error::EndpointError;
use crate::opcode::Opcode;

static WILDCARDS: Lazy<Registry<WildcardInner>> = Lazy::new(Registry::new);

struct WildcardInner {
    endpoint: Endpoint,
}

impl Drop for WildcardInner {
    fn drop(&mut self) {
        WILDCARDS.release(&self.endpoint.to_string());
    }
}

/// "This identity, any instance". Interned per wrapped endpoint.
#[derive(Clone)]
pub struct WildcardTarget(Arc<WildcardInner>);

impl WildcardTarget {
    pub fn get(endpoint: &Endpoint) -> WildcardTarget {
        let key = endpoint.to_string();
        let inner = WILDCARDS.intern(&key, || {
            Ok::<_, std::convert::Infallible>(WildcardInner {
                endpoint: endpoint.clone(),
            })
        });
        match inner {
            Ok(inner) => WildcardTarget(inner),
            Err(never) => match never {},
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.0.endpoint
    }
}

impl PartialEq for WildcardTarget {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for WildcardTarget {}

impl Hash for WildcardTarget {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for WildcardTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WildcardTarget({})", self.0.endpoint)
    }
}

/// Any addressable value a filter can name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    Endpoint(Endpoint),
    Wildcard(WildcardTarget),
}

impl Target {
    /// Resolve a name with an optional explicit instance and kind hint.
    ///
    /// `name` may carry its own prefix; otherwise the hint selects the kind.
    /// A wildcard hint wraps the endpoint in a [`WildcardTarget`].
    pub fn get(
        name: &str,
        instance: Option<InstanceRef<'_>>,
        kind_hint: Option<Opcode>,
    ) -> Result<Target> {
        let hinted = kind_hint.and_then(EndpointKind::from_opcode);
        let (kind, rest) = match EndpointKind::split_prefix(name) {
            Some(split) => split,
            None => (
                hinted.ok_or_else(|| EndpointError::UnknownPrefix(name.to_string()))?,
                name,
            ),
        };
        let (bare, suffix) = match rest.split_once('/') {
            Some((bare, suffix)) => (bare, Some(suffix)),
            None => (rest, None),
        };
        let instance = instance
            .or(suffix.map(InstanceRef::Text))
            .unwrap_or(InstanceRef::Default);
        let endpoint = Endpoint::from_name(kind, bare, instance)?;
        if kind_hint.is_some_and(Opcode::is_wildcard_endpoint) {
            Ok(Target::Wildcard(WildcardTarget::get(&endpoint)))
        } else {
            Ok(Target::Endpoint(endpoint))
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        match self {
            Target::Endpoint(endpoint) => endpoint,
            Target::Wildcard(wildcard) => wildcard.endpoint(),
        }
    }
}

impl From<Endpoint> for Target {
    fn from(endpoint: Endpoint) -> Self {
        Target::Endpoint(endpoint)
    }
}

impl From<WildcardTarget> for Target {
    fn from(wildcard: WildcardTarget) -> Self {
        Target::Wildcard(wildcard)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.endpoint(), f)
    }
}

/// Whether `value` satisfies a filter naming `against`.
///
/// A filter without an instance accepts every instance of that identity, but
/// not the other way around.
pub fn logical_match(value: &Target, against: &Target) -> bool {
    if let Target::Endpoint(filter) = against
        && filter.is_broadcast()
    {
        return true;
    }
    if value == against {
        return true;
    }
    match (value, against) {
        (Target::Endpoint(value), Target::Endpoint(filter)) => {
            value.main() == *filter || value.equals(filter)
        }
        (Target::Endpoint(value), Target::Wildcard(filter)) => {
            value.main() == filter.endpoint().main()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_absorbs_instance_but_not_the_reverse() -> Result<()> {
        let e: Target = Endpoint::get("@tg_law/0001")?.into();
        let main: Target = e.endpoint().main().into();
        assert!(logical_match(&e, &main));
        assert!(!logical_match(&main, &e));
        assert!(logical_match(&main, &main));
        Ok(())
    }

    #[test]
    fn default_instance_matches_both_ways() -> Result<()> {
        let e: Target = Endpoint::get("@tg_plain")?.into();
        let main: Target = e.endpoint().main().into();
        assert!(logical_match(&e, &main));
        assert!(logical_match(&main, &e));
        Ok(())
    }

    #[test]
    fn broadcast_accepts_everything() -> Result<()> {
        let any: Target = Endpoint::broadcast().into();
        let e: Target = Endpoint::get("@+tg_inst/0a")?.into();
        assert!(logical_match(&e, &any));
        let w: Target = WildcardTarget::get(&Endpoint::get("@tg_w")?).into();
        assert!(logical_match(&w, &any));
        Ok(())
    }

    #[test]
    fn distinct_identities_do_not_match() -> Result<()> {
        let a: Target = Endpoint::get("@tg_a")?.into();
        let b: Target = Endpoint::get("@tg_b/0001")?.into();
        assert!(!logical_match(&a, &b));
        assert!(!logical_match(&b, &a));
        Ok(())
    }

    #[test]
    fn wildcard_filter_matches_any_instance() -> Result<()> {
        let wildcard: Target = WildcardTarget::get(&Endpoint::get("@tg_wild")?).into();
        let instance: Target = Endpoint::get("@tg_wild/00ff")?.into();
        assert!(logical_match(&instance, &wildcard));
        assert!(!logical_match(&wildcard, &instance));
        Ok(())
    }

    #[test]
    fn wildcards_are_interned_per_endpoint() -> Result<()> {
        let e = Endpoint::get("@tg_wi")?;
        assert_eq!(WildcardTarget::get(&e), WildcardTarget::get(&e));
        assert_ne!(
            WildcardTarget::get(&e),
            WildcardTarget::get(&Endpoint::get("@tg_wi/0001")?)
        );
        Ok(())
    }

    #[test]
    fn get_with_hints_and_explicit_instance() -> Result<()> {
        let t = Target::get("tg_hint", Some(InstanceRef::Numeric(2)), Some(Opcode::InstitutionAlias))?;
        assert_eq!(t.to_string(), "@+tg_hint/0002");
        let w = Target::get("@tg_hint", None, Some(Opcode::PersonAliasWildcard))?;
        assert!(matches!(w, Target::Wildcard(_)));
        assert_eq!(w.endpoint(), &Endpoint::get("@tg_hint")?);
        let explicit = Target::get("@tg_hint/0001", Some(InstanceRef::Numeric(5)), None)?;
        assert_eq!(explicit.endpoint().instance(), 5);
        assert!(Target::get("tg_hint", None, None).is_err());
        Ok(())
    }
}
