//! Access paths to remote objects and the outcome of multi-object access.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ReplError, Result};
use crate::identifier::{NetMeshBaseIdentifier, NetMeshObjectIdentifier, PATH_SEPARATOR, SEPARATOR};
use crate::object::NetMeshObject;

const COHERENCE_PARAMETER: &str = "?coherence=";

/// Default fallback delay of the adaptive coherence: one hour.
pub const DEFAULT_FALLBACK_DELAY_MS: u64 = 60 * 60 * 1000;
/// Default maximum delay of the adaptive coherence: one week.
pub const DEFAULT_MAX_DELAY_MS: u64 = 7 * 24 * 60 * 60 * 1000;
/// Default growth factor of the adaptive coherence.
pub const DEFAULT_ADAPTIVE_FACTOR: f64 = 1.1;

/// How fresh a replica obtained through a hop is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CoherenceSpecification {
    /// Obtain once, never refresh.
    OneTimeOnly,
    /// Refresh at a fixed period.
    Periodic {
        /// Period in milliseconds.
        period_ms: u64,
    },
    /// Refresh quickly after changes and back off while nothing changes.
    AdaptivePeriodic {
        /// Delay used after a change was observed (milliseconds).
        fallback_delay_ms: u64,
        /// Upper bound of the delay (milliseconds).
        max_delay_ms: u64,
        /// Factor applied to the previous delay while nothing changes.
        adaptive_factor: f64,
    },
}

impl Default for CoherenceSpecification {
    fn default() -> Self {
        CoherenceSpecification::AdaptivePeriodic {
            fallback_delay_ms: DEFAULT_FALLBACK_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            adaptive_factor: DEFAULT_ADAPTIVE_FACTOR,
        }
    }
}

impl CoherenceSpecification {
    /// Delay until the next refresh, or `None` if no refresh is due ever again.
    pub fn next_delay_ms(&self, previous_delay_ms: Option<u64>, something_changed: bool) -> Option<u64> {
        match *self {
            CoherenceSpecification::OneTimeOnly => None,
            CoherenceSpecification::Periodic { period_ms } => Some(period_ms),
            CoherenceSpecification::AdaptivePeriodic {
                fallback_delay_ms,
                max_delay_ms,
                adaptive_factor,
            } => match previous_delay_ms {
                Some(previous) if !something_changed => {
                    let grown = (previous as f64 * adaptive_factor).round() as u64;
                    Some(grown.min(max_delay_ms))
                }
                _ => Some(fallback_delay_ms),
            },
        }
    }

    /// String form: `OneTimeOnly`, `Periodic{ms}` or `AdaptivePeriodic{fallback,max,factor}`.
    pub fn to_external_form(&self) -> String {
        match self {
            CoherenceSpecification::OneTimeOnly => "OneTimeOnly".to_string(),
            CoherenceSpecification::Periodic { period_ms } => format!("Periodic{{{period_ms}}}"),
            CoherenceSpecification::AdaptivePeriodic {
                fallback_delay_ms,
                max_delay_ms,
                adaptive_factor,
            } => format!("AdaptivePeriodic{{{fallback_delay_ms},{max_delay_ms},{adaptive_factor}}}"),
        }
    }

    /// Parse the string form.
    pub fn from_external_form(s: &str) -> Result<Self> {
        let bad = || ReplError::Identifier {
            msg: format!("invalid coherence specification {s:?}"),
        };
        if s == "OneTimeOnly" {
            return Ok(CoherenceSpecification::OneTimeOnly);
        }
        let (name, args) = s
            .strip_suffix('}')
            .and_then(|rest| rest.split_once('{'))
            .ok_or_else(bad)?;
        let args: Vec<&str> = args.split(',').map(str::trim).collect();
        match (name, args.as_slice()) {
            ("Periodic", [period]) => Ok(CoherenceSpecification::Periodic {
                period_ms: period.parse().map_err(|_| bad())?,
            }),
            ("AdaptivePeriodic", [fallback, max, factor]) => Ok(CoherenceSpecification::AdaptivePeriodic {
                fallback_delay_ms: fallback.parse().map_err(|_| bad())?,
                max_delay_ms: max.parse().map_err(|_| bad())?,
                adaptive_factor: factor.parse().map_err(|_| bad())?,
            }),
            _ => Err(bad()),
        }
    }
}

impl fmt::Display for CoherenceSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_external_form())
    }
}

/// One hop of an access path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessHop {
    /// MeshBase to contact.
    pub base: NetMeshBaseIdentifier,
    /// Coherence requested from that MeshBase, if any.
    pub coherence: Option<CoherenceSpecification>,
}

impl AccessHop {
    /// Hop without a coherence request.
    pub fn new(base: NetMeshBaseIdentifier) -> Self {
        Self {
            base,
            coherence: None,
        }
    }

    fn to_external_form(&self) -> String {
        match &self.coherence {
            Some(c) => format!("{}{}{}", self.base, COHERENCE_PARAMETER, c.to_external_form()),
            None => self.base.to_external_form(),
        }
    }

    fn from_external_form(s: &str) -> Result<Self> {
        match s.split_once(COHERENCE_PARAMETER) {
            Some((base, coherence)) => Ok(Self {
                base: NetMeshBaseIdentifier::create(base)?,
                coherence: Some(CoherenceSpecification::from_external_form(coherence)?),
            }),
            None => Ok(Self::new(NetMeshBaseIdentifier::create(s)?)),
        }
    }
}

/// How to reach an object: the MeshBases to hop through, then the object itself.
///
/// An empty path means the object's own home MeshBase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetMeshObjectAccessSpecification {
    path: Vec<AccessHop>,
    object: NetMeshObjectIdentifier,
}

impl NetMeshObjectAccessSpecification {
    /// Create from a full path.
    pub fn new(path: Vec<AccessHop>, object: NetMeshObjectIdentifier) -> Self {
        Self { path, object }
    }

    /// Reach `object` through the single MeshBase `base`.
    pub fn via(base: NetMeshBaseIdentifier, object: NetMeshObjectIdentifier) -> Self {
        Self::new(vec![AccessHop::new(base)], object)
    }

    /// Reach `object` at its home MeshBase.
    pub fn to_home(object: NetMeshObjectIdentifier) -> Self {
        Self::new(Vec::new(), object)
    }

    /// The hops.
    pub fn path(&self) -> &[AccessHop] {
        &self.path
    }

    /// The target object.
    pub fn object(&self) -> &NetMeshObjectIdentifier {
        &self.object
    }

    /// The first hop, falling back to the object's home MeshBase.
    pub fn first_hop(&self) -> AccessHop {
        self.path
            .first()
            .cloned()
            .unwrap_or_else(|| AccessHop::new(self.object.base().clone()))
    }

    /// This specification with the first hop removed.
    pub fn remainder(&self) -> Self {
        Self {
            path: self.path.iter().skip(1).cloned().collect(),
            object: self.object.clone(),
        }
    }

    /// `hop!hop#escaped-object`.
    pub fn to_external_form(&self) -> String {
        let hops: Vec<String> = self.path.iter().map(AccessHop::to_external_form).collect();
        format!(
            "{}{}{}",
            hops.join(&PATH_SEPARATOR.to_string()),
            SEPARATOR,
            escape(&self.object.to_external_form())
        )
    }

    /// Parse the external form.
    pub fn from_external_form(s: &str) -> Result<Self> {
        let (hops, object) = s.split_once(SEPARATOR).ok_or_else(|| ReplError::Identifier {
            msg: format!("access specification {s:?} lacks an object"),
        })?;
        let path = if hops.is_empty() {
            Vec::new()
        } else {
            hops.split(PATH_SEPARATOR)
                .map(AccessHop::from_external_form)
                .collect::<Result<Vec<_>>>()?
        };
        let object = NetMeshObjectIdentifier::from_external_form(&unescape(object)?)?;
        Ok(Self { path, object })
    }
}

impl fmt::Display for NetMeshObjectAccessSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_external_form())
    }
}

fn escape(s: &str) -> String {
    s.replace('%', "%25").replace(SEPARATOR, "%23")
}

fn unescape(s: &str) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3).ok_or_else(|| ReplError::Identifier {
            msg: format!("truncated escape in {s:?}"),
        })?;
        match code {
            "25" => out.push('%'),
            "23" => out.push(SEPARATOR),
            other => {
                return Err(ReplError::Identifier {
                    msg: format!("unknown escape %{other} in {s:?}"),
                })
            }
        }
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Ok(out)
}

/// What happened to one requested object.
#[derive(Debug)]
pub enum AccessResult {
    /// Found under the requested identifier.
    Found(NetMeshObject),
    /// Found, but under a different (equivalent) identifier.
    Redirected {
        /// The replica that stands in for the requested one.
        found: NetMeshObject,
    },
    /// Not found, for the given reason.
    NotFound(ReplError),
}

impl AccessResult {
    /// The object, if one was found.
    pub fn object(&self) -> Option<&NetMeshObject> {
        match self {
            AccessResult::Found(obj) | AccessResult::Redirected { found: obj } => Some(obj),
            AccessResult::NotFound(_) => None,
        }
    }
}

/// Per-element outcome of accessing several objects at once.
#[derive(Debug)]
pub struct AccessOutcome {
    requested: Vec<NetMeshObjectAccessSpecification>,
    results: Vec<Option<AccessResult>>,
}

impl AccessOutcome {
    /// Create an outcome. There must be one result slot per request and at
    /// least one slot must say something.
    pub fn new(
        requested: Vec<NetMeshObjectAccessSpecification>,
        results: Vec<Option<AccessResult>>,
    ) -> Result<Self> {
        if requested.len() != results.len() {
            return Err(ReplError::InvalidAccessOutcome {
                msg: format!("{} requests but {} results", requested.len(), results.len()),
            });
        }
        if results.iter().all(Option::is_none) {
            return Err(ReplError::InvalidAccessOutcome {
                msg: "no object found and no cause given".to_string(),
            });
        }
        Ok(Self { requested, results })
    }

    /// The outcome of asking for nothing.
    pub fn empty() -> Self {
        Self {
            requested: Vec::new(),
            results: Vec::new(),
        }
    }

    /// What was asked for.
    pub fn requested(&self) -> &[NetMeshObjectAccessSpecification] {
        &self.requested
    }

    /// One slot per request.
    pub fn results(&self) -> &[Option<AccessResult>] {
        &self.results
    }

    /// True if at least one object was found or redirected.
    pub fn is_partial_result_available(&self) -> bool {
        self.results.iter().flatten().any(|r| r.object().is_some())
    }

    /// True if every requested object was found or redirected.
    pub fn is_complete_result_available(&self) -> bool {
        self.results
            .iter()
            .all(|r| r.as_ref().and_then(AccessResult::object).is_some())
    }

    /// Whatever was found, in request order.
    pub fn best_effort_result(&self) -> Vec<Option<&NetMeshObject>> {
        self.results
            .iter()
            .map(|r| r.as_ref().and_then(AccessResult::object))
            .collect()
    }

    /// Why the object at `index` was not found.
    pub fn cause_for(&self, index: usize) -> Option<&ReplError> {
        match self.results.get(index) {
            Some(Some(AccessResult::NotFound(cause))) => Some(cause),
            _ => None,
        }
    }

    /// Consume into the found objects, in request order.
    pub fn into_objects(self) -> Vec<Option<NetMeshObject>> {
        self.results
            .into_iter()
            .map(|r| match r {
                Some(AccessResult::Found(obj)) | Some(AccessResult::Redirected { found: obj }) => Some(obj),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::NetMeshObjectIdentifier;

    fn base(s: &str) -> NetMeshBaseIdentifier {
        NetMeshBaseIdentifier::create(s).unwrap()
    }

    fn object(b: &str, local: &str) -> NetMeshObjectIdentifier {
        NetMeshObjectIdentifier::create(base(b), Some(local)).unwrap()
    }

    mod coherence {
        use super::*;

        #[test]
        fn test_default_is_adaptive() {
            assert_eq!(
                CoherenceSpecification::default(),
                CoherenceSpecification::AdaptivePeriodic {
                    fallback_delay_ms: DEFAULT_FALLBACK_DELAY_MS,
                    max_delay_ms: DEFAULT_MAX_DELAY_MS,
                    adaptive_factor: DEFAULT_ADAPTIVE_FACTOR,
                }
            );
        }

        #[test]
        fn test_parse_forms() {
            for c in [
                CoherenceSpecification::OneTimeOnly,
                CoherenceSpecification::Periodic { period_ms: 250 },
                CoherenceSpecification::AdaptivePeriodic {
                    fallback_delay_ms: 10,
                    max_delay_ms: 100,
                    adaptive_factor: 1.5,
                },
            ] {
                let parsed = CoherenceSpecification::from_external_form(&c.to_external_form()).unwrap();
                assert_eq!(parsed, c);
            }
        }

        #[test]
        fn test_rejects_garbage() {
            assert!(CoherenceSpecification::from_external_form("Sometimes").is_err());
            assert!(CoherenceSpecification::from_external_form("Periodic{x}").is_err());
            assert!(CoherenceSpecification::from_external_form("AdaptivePeriodic{1,2}").is_err());
        }

        #[test]
        fn test_adaptive_backs_off_and_resets() {
            let c = CoherenceSpecification::AdaptivePeriodic {
                fallback_delay_ms: 100,
                max_delay_ms: 150,
                adaptive_factor: 1.2,
            };
            assert_eq!(c.next_delay_ms(None, false), Some(100));
            assert_eq!(c.next_delay_ms(Some(100), false), Some(120));
            assert_eq!(c.next_delay_ms(Some(140), false), Some(150));
            assert_eq!(c.next_delay_ms(Some(150), true), Some(100));
        }

        #[test]
        fn test_one_time_only_never_repeats() {
            assert_eq!(CoherenceSpecification::OneTimeOnly.next_delay_ms(None, true), None);
            assert_eq!(
                CoherenceSpecification::Periodic { period_ms: 7 }.next_delay_ms(Some(1), false),
                Some(7)
            );
        }
    }

    mod access_specification {
        use super::*;

        #[test]
        fn test_external_form_escapes_object() {
            let spec = NetMeshObjectAccessSpecification::via(base("http://a/"), object("http://b/", "x"));
            assert_eq!(spec.to_external_form(), "http://a/#http://b/%23x");
        }

        #[test]
        fn test_multi_hop_parse() {
            let spec = NetMeshObjectAccessSpecification::new(
                vec![
                    AccessHop::new(base("http://a/")),
                    AccessHop {
                        base: base("http://b/?q=1%"),
                        coherence: Some(CoherenceSpecification::Periodic { period_ms: 5 }),
                    },
                ],
                object("http://c/", "obj"),
            );
            let form = spec.to_external_form();
            let parsed = NetMeshObjectAccessSpecification::from_external_form(&form).unwrap();
            assert_eq!(parsed, spec);
            assert_eq!(parsed.remainder().path().len(), 1);
        }

        #[test]
        fn test_first_hop_defaults_to_home() {
            let spec = NetMeshObjectAccessSpecification::to_home(object("http://c/", "obj"));
            assert_eq!(spec.first_hop().base, base("http://c/"));
            assert!(spec.to_external_form().starts_with('#'));
        }

        #[test]
        fn test_rejects_missing_object() {
            assert!(NetMeshObjectAccessSpecification::from_external_form("http://a/").is_err());
            assert!(NetMeshObjectAccessSpecification::from_external_form("http://a/#x%2").is_err());
        }
    }

    mod outcome {
        use super::*;

        fn spec(local: &str) -> NetMeshObjectAccessSpecification {
            NetMeshObjectAccessSpecification::to_home(object("http://a/", local))
        }

        #[test]
        fn test_all_empty_is_rejected() {
            let err = AccessOutcome::new(vec![spec("x"), spec("y")], vec![None, None]).unwrap_err();
            assert!(matches!(err, ReplError::InvalidAccessOutcome { .. }));
            assert!(AccessOutcome::new(Vec::new(), Vec::new()).is_err());
        }

        #[test]
        fn test_length_mismatch_is_rejected() {
            let err = AccessOutcome::new(vec![spec("x")], Vec::new()).unwrap_err();
            assert!(matches!(err, ReplError::InvalidAccessOutcome { .. }));
        }

        #[test]
        fn test_partial_result() {
            let found = NetMeshObject::new(object("http://a/", "x"), 1);
            let outcome = AccessOutcome::new(
                vec![spec("x"), spec("y"), spec("z")],
                vec![
                    Some(AccessResult::Found(found.clone())),
                    Some(AccessResult::NotFound(ReplError::ObjectNotFound {
                        identifier: object("http://a/", "y"),
                    })),
                    None,
                ],
            )
            .unwrap();
            assert!(outcome.is_partial_result_available());
            assert!(!outcome.is_complete_result_available());
            assert_eq!(outcome.best_effort_result(), vec![Some(&found), None, None]);
            assert!(matches!(outcome.cause_for(1), Some(ReplError::ObjectNotFound { .. })));
            assert!(outcome.cause_for(0).is_none());
        }

        #[test]
        fn test_redirected_counts_as_found() {
            let stand_in = NetMeshObject::new(object("http://a/", "other"), 1);
            let outcome = AccessOutcome::new(
                vec![spec("x")],
                vec![Some(AccessResult::Redirected { found: stand_in.clone() })],
            )
            .unwrap();
            assert!(outcome.is_complete_result_available());
            assert_eq!(outcome.into_objects(), vec![Some(stand_in)]);
        }
    }
}
