//! Layer eligibility for interchange.

use std::collections::BTreeSet;

use crate::SyncConfig;

/// System tables that never leave the container.
pub const SYSTEM_TABLES: &[&str] = &["layer_styles", "qgis_projects"];

/// The standardised spatial-plan layers exported by default.
pub const STANDARD_LAYERS: &[&str] = &[
    "ReseneUzemi_p",
    "UzemiPrvkyRP_p",
    "ZastaveneUzemi_p",
    "ZastavitelneUzemi_p",
    "PlochyRZV_p",
    "UzemniRezervy_p",
    "KoridoryP_p",
    "KoridoryN_p",
    "Lokality_p",
    "PlochyZmen_p",
    "PlochyPodm_p",
    "VpsVpoAs_p",
    "VpsVpoAs_l",
    "USES_p",
    "SystemSidelniZelene_p",
    "SystemVerProstr_p",
    "PlochaVI_p",
    "Zpochybneno_p",
];

/// Prefix that marks ad hoc "extra" layers outside the standard set.
pub const DEFAULT_EXTRA_PREFIX: &str = "X";

/// Static `(deny, allow, prefix)` triple deciding which layers are exported.
///
/// Precedence: the deny set wins unconditionally; otherwise a layer is
/// eligible when it is in the allow set or starts with the prefix
/// (case-sensitive).
///
/// # Examples
/// ```
/// use layersync_core::SelectionPolicy;
///
/// let policy = SelectionPolicy::new(["qgis_projects"], ["PlochyRZV_p", "qgis_projects"], Some("X"));
/// assert!(policy.is_eligible("PlochyRZV_p"));
/// assert!(policy.is_eligible("XHranice_l"));
/// assert!(!policy.is_eligible("xHranice_l"));
/// assert!(!policy.is_eligible("qgis_projects"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionPolicy {
    deny: BTreeSet<String>,
    allow: BTreeSet<String>,
    prefix: Option<String>,
}

/// Why a layer failed [`SelectionPolicy::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    /// The name is in the deny set.
    Denied,
    /// The name is neither allowed nor prefixed.
    NotSelected,
}

impl SelectionPolicy {
    /// Build a policy from deny names, allow names and an optional prefix.
    ///
    /// An empty prefix is treated as absent so it cannot match every name.
    #[must_use]
    pub fn new<D, A, S, T>(deny: D, allow: A, prefix: Option<&str>) -> Self
    where
        D: IntoIterator<Item = S>,
        A: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            deny: deny.into_iter().map(Into::into).collect(),
            allow: allow.into_iter().map(Into::into).collect(),
            prefix: prefix.filter(|p| !p.is_empty()).map(str::to_owned),
        }
    }

    /// Derive the policy from a pass configuration.
    #[must_use]
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.exclude_layers.iter().map(String::as_str),
            config.include_layers.iter().map(String::as_str),
            config.extra_prefix.as_deref(),
        )
    }

    /// Whether `layer_name` may be exported.
    #[must_use]
    pub fn is_eligible(&self, layer_name: &str) -> bool {
        self.check(layer_name).is_ok()
    }

    /// Like [`Self::is_eligible`] but explains rejections.
    pub fn check(&self, layer_name: &str) -> Result<(), Ineligible> {
        if self.deny.contains(layer_name) {
            return Err(Ineligible::Denied);
        }
        if self.allow.contains(layer_name) || self.matches_prefix(layer_name) {
            return Ok(());
        }
        Err(Ineligible::NotSelected)
    }

    fn matches_prefix(&self, layer_name: &str) -> bool {
        self.prefix
            .as_deref()
            .is_some_and(|prefix| layer_name.starts_with(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn policy() -> SelectionPolicy {
        SelectionPolicy::new(
            SYSTEM_TABLES.iter().copied().chain(["XSkryta_p"]),
            STANDARD_LAYERS.iter().copied().chain(["layer_styles"]),
            Some(DEFAULT_EXTRA_PREFIX),
        )
    }

    #[rstest]
    #[case("PlochyRZV_p", Ok(()))]
    #[case("XDoplnek_l", Ok(()))]
    #[case("xDoplnek_l", Err(Ineligible::NotSelected))]
    #[case("layer_styles", Err(Ineligible::Denied))]
    #[case("XSkryta_p", Err(Ineligible::Denied))]
    #[case("Ostatni_p", Err(Ineligible::NotSelected))]
    #[case("", Err(Ineligible::NotSelected))]
    fn applies_precedence(
        policy: SelectionPolicy,
        #[case] name: &str,
        #[case] expected: Result<(), Ineligible>,
    ) {
        assert_eq!(policy.check(name), expected);
    }

    #[rstest]
    fn empty_prefix_matches_nothing() {
        let policy = SelectionPolicy::new(Vec::<String>::new(), Vec::<String>::new(), Some(""));
        assert!(!policy.is_eligible("anything"));
    }

    #[rstest]
    fn builds_from_config() {
        let config = SyncConfig {
            include_layers: vec!["A".into()],
            exclude_layers: vec!["A".into()],
            extra_prefix: Some("Z".into()),
            ..SyncConfig::default()
        };
        let policy = SelectionPolicy::from_config(&config);
        assert!(!policy.is_eligible("A"), "deny must win over allow");
        assert!(policy.is_eligible("Zona"));
    }
}
