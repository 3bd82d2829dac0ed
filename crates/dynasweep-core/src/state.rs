//! State variables, states and the swept state space
//!
//! A [`State`] is one point of the cross-product of the declared
//! [`StateVariable`] ranges. Floating-point values are normalised to
//! [`SIGNIFICANT_FIGURES`] so that jitter in how a range was generated never
//! produces a second directory for what is physically the same point.

use crate::error::{Error, Result};
use crate::workdir::{Resolver, WorkItem};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};

/// Significant figures kept when normalising floating-point state values
pub const SIGNIFICANT_FIGURES: usize = 14;

/// Round to [`SIGNIFICANT_FIGURES`], folding `-0.0` into `0.0`
#[must_use]
pub fn normalize_f64(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let rounded: f64 = format!("{:.*e}", SIGNIFICANT_FIGURES - 1, value)
        .parse()
        .unwrap_or(value);
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Value of one state variable
///
/// Numeric variants compare by exact value: two `Int`s compare as integers,
/// floats by their normalised `f64`, and `Int(2)` and `Float(2.0)` denote the
/// same point. Text sorts after numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ValueRepr", into = "ValueRepr")]
pub enum StateValue {
    /// Integral value (e.g. a particle count)
    Int(i64),
    /// Real value, normalised on construction
    Float(f64),
    /// Opaque categorical value
    Text(String),
}

impl StateValue {
    /// Normalised float value
    #[inline]
    #[must_use]
    pub fn float(value: f64) -> Self {
        Self::Float(normalize_f64(value))
    }

    /// Categorical value
    #[inline]
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Re-apply normalisation (used after deserialisation)
    #[must_use]
    pub fn normalized(self) -> Self {
        match self {
            Self::Float(v) => Self::Float(normalize_f64(v)),
            other => other,
        }
    }

    /// Numeric view, `None` for text
    #[inline]
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(normalize_f64(*v)),
            Self::Text(_) => None,
        }
    }

    /// Text view, `None` for numbers
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Wire form of a [`StateValue`]; JSON has no literal for `inf`/`nan`
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ValueRepr {
    Int(i64),
    Float(f64),
    Text(String),
    NonFinite { float: String },
}

impl From<ValueRepr> for StateValue {
    fn from(repr: ValueRepr) -> Self {
        match repr {
            ValueRepr::Int(v) => Self::Int(v),
            ValueRepr::Float(v) => Self::float(v),
            ValueRepr::Text(s) => Self::Text(s),
            ValueRepr::NonFinite { float } => Self::Float(float.parse().unwrap_or(f64::NAN)),
        }
    }
}

impl From<StateValue> for ValueRepr {
    fn from(value: StateValue) -> Self {
        match value {
            StateValue::Int(v) => Self::Int(v),
            StateValue::Float(v) if v.is_finite() => Self::Float(v),
            StateValue::Float(v) => Self::NonFinite {
                float: v.to_string(),
            },
            StateValue::Text(s) => Self::Text(s),
        }
    }
}

impl PartialEq for StateValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for StateValue {}

impl PartialOrd for StateValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StateValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Int(a), Self::Float(_)) => cmp_int_float(*a, other.as_f64().unwrap_or(f64::NAN)),
            (Self::Float(_), Self::Int(b)) => {
                cmp_int_float(*b, self.as_f64().unwrap_or(f64::NAN)).reverse()
            }
            (Self::Float(_), Self::Float(_)) => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => Ordering::Equal,
            },
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Text(_), _) => Ordering::Greater,
            (_, Self::Text(_)) => Ordering::Less,
        }
    }
}

/// Exact comparison of an integer against a float
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn cmp_int_float(int: i64, float: f64) -> Ordering {
    match (int as f64).total_cmp(&float) {
        // `float` is integral and within rounding distance of `int`
        Ordering::Equal => i128::from(int).cmp(&(float as i128)),
        unequal => unequal,
    }
}

/// `Some` if `int` converts to `f64` without loss
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn exact_f64(int: i64) -> Option<f64> {
    let float = int as f64;
    (float as i128 == i128::from(int)).then_some(float)
}

impl Hash for StateValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Equal values must hash alike, so exactly representable integers
        // hash as their float
        match self {
            Self::Int(v) => match exact_f64(*v) {
                Some(f) => {
                    0u8.hash(state);
                    f.to_bits().hash(state);
                }
                None => {
                    2u8.hash(state);
                    v.hash(state);
                }
            },
            Self::Float(_) => {
                0u8.hash(state);
                self.as_f64().unwrap_or(f64::NAN).to_bits().hash(state);
            }
            Self::Text(text) => {
                1u8.hash(state);
                text.hash(state);
            }
        }
    }
}

impl Display for StateValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            // Shortest representation that round-trips the normalised value
            Self::Float(v) => write!(f, "{}", normalize_f64(*v)),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        Self::float(value)
    }
}

impl From<i64> for StateValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A swept variable with its ordered candidate values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVariable {
    /// Variable name
    pub name: String,
    /// Candidate values in sweep order
    pub values: Vec<StateValue>,
}

impl StateVariable {
    /// Create a variable, normalising its values
    #[must_use]
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = StateValue>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(StateValue::normalized).collect(),
        }
    }

    /// `true` if `value` is one of the candidates
    #[must_use]
    pub fn contains(&self, value: &StateValue) -> bool {
        self.values.iter().any(|v| v == value)
    }
}

/// One point in the sweep: ordered `(variable, value)` pairs
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct State(IndexMap<String, StateValue>);

impl State {
    /// Empty state
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from pairs, keeping their order
    #[must_use]
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, StateValue)>,
        K: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.normalized()))
                .collect(),
        )
    }

    /// Value of a variable
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StateValue> {
        self.0.get(name)
    }

    /// `true` if the variable is present
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Set a variable (appended if new, in place otherwise)
    pub fn insert(&mut self, name: impl Into<String>, value: StateValue) {
        self.0.insert(name.into(), value.normalized());
    }

    /// Pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StateValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of variables
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if no variables are set
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Restrict and reorder to `variables`, dropping unknown names
    #[must_use]
    pub fn project(&self, variables: &[StateVariable]) -> Self {
        Self(
            variables
                .iter()
                .filter_map(|var| self.0.get(&var.name).map(|v| (var.name.clone(), v.clone())))
                .collect(),
        )
    }

    /// Canonical signature `name_value_name_value...`
    #[must_use]
    pub fn signature(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}_{v}"))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Compare by values in `variables` order (missing values sort first)
    #[must_use]
    pub fn cmp_by(&self, other: &Self, variables: &[StateVariable]) -> Ordering {
        variables
            .iter()
            .map(|var| self.get(&var.name).cmp(&other.get(&var.name)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

// Equality is order-insensitive (as for `IndexMap`), so the hash must be too.
impl Hash for State {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let combined = self.0.iter().fold(0u64, |acc, (k, v)| {
            let mut entry = DefaultHasher::new();
            k.hash(&mut entry);
            v.hash(&mut entry);
            acc.wrapping_add(entry.finish())
        });
        self.0.len().hash(state);
        combined.hash(state);
    }
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// The full cross-product of declared variables, times restarts
#[derive(Debug, Clone)]
pub struct StateSpace {
    variables: Vec<StateVariable>,
    restarts: u32,
}

impl StateSpace {
    /// Validate and create a state space
    ///
    /// # Errors
    /// `Configuration` on zero restarts, duplicate or empty variables, or
    /// names/values that cannot appear in a directory name
    pub fn new(variables: Vec<StateVariable>, restarts: u32) -> Result<Self> {
        if restarts == 0 {
            return Err(Error::Configuration("restarts must be at least 1".into()));
        }
        for (i, var) in variables.iter().enumerate() {
            check_path_safe(&var.name)?;
            if var.values.is_empty() {
                return Err(Error::Configuration(format!(
                    "state variable \"{}\" has no values",
                    var.name
                )));
            }
            if variables[..i].iter().any(|v| v.name == var.name) {
                return Err(Error::Configuration(format!(
                    "state variable \"{}\" declared twice",
                    var.name
                )));
            }
            for value in &var.values {
                if let StateValue::Text(text) = value {
                    check_path_safe(text)?;
                }
            }
        }
        Ok(Self {
            variables: variables
                .into_iter()
                .map(|v| StateVariable::new(v.name, v.values))
                .collect(),
            restarts,
        })
    }

    /// Declared variables in order
    #[inline]
    #[must_use]
    pub fn variables(&self) -> &[StateVariable] {
        &self.variables
    }

    /// Restarts per state
    #[inline]
    #[must_use]
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Number of distinct states `Π|values_i|`
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.variables.iter().map(|v| v.values.len()).product()
    }

    /// Number of work items `R × Π|values_i|`
    #[must_use]
    pub fn len(&self) -> usize {
        self.state_count() * self.restarts as usize
    }

    /// `true` if the space has no points
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// States in lexicographic product order (last variable varies fastest)
    #[must_use]
    pub fn states(&self) -> Vec<State> {
        let mut states = vec![State::new()];
        for var in &self.variables {
            states = states
                .into_iter()
                .flat_map(|prefix| {
                    var.values.iter().map(move |value| {
                        let mut next = prefix.clone();
                        next.insert(var.name.clone(), value.clone());
                        next
                    })
                })
                .collect();
        }
        states
    }

    /// `(state, restart)` pairs, restarts innermost
    #[must_use]
    pub fn points(&self) -> Vec<(State, u32)> {
        self.states()
            .into_iter()
            .flat_map(|state| (0..self.restarts).map(move |r| (state.clone(), r)))
            .collect()
    }

    /// Work items with their directories assigned by `resolver`
    ///
    /// # Errors
    /// See [`Resolver::items`]
    pub fn items(&self, resolver: &Resolver) -> Result<Vec<WorkItem>> {
        resolver.items(self)
    }

    /// `true` if every declared value of `state` is a candidate value
    #[must_use]
    pub fn contains(&self, state: &State) -> bool {
        self.variables
            .iter()
            .all(|var| state.get(&var.name).is_some_and(|v| var.contains(v)))
    }
}

fn check_path_safe(text: &str) -> Result<()> {
    if text.is_empty()
        || text == "."
        || text == ".."
        || text.contains(|c: char| c == '/' || c == '\\' || c == '\0')
    {
        return Err(Error::Configuration(format!(
            "\"{text}\" cannot be used in a directory name"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn space() -> StateSpace {
        StateSpace::new(
            vec![
                StateVariable::new("N", [StateValue::Int(108), StateValue::Int(256)]),
                StateVariable::new("ndensity", [0.5.into(), 0.6.into(), 0.7.into()]),
            ],
            2,
        )
        .unwrap()
    }

    #[test]
    fn item_count_is_restarts_times_product() {
        let space = space();
        assert_eq!(space.state_count(), 6);
        assert_eq!(space.len(), 12);
        assert_eq!(space.points().len(), 12);
    }

    #[test]
    fn lexicographic_order() {
        let states = space().states();
        let sigs: Vec<String> = states.iter().map(State::signature).collect();
        assert_eq!(sigs[0], "N_108_ndensity_0.5");
        assert_eq!(sigs[1], "N_108_ndensity_0.6");
        assert_eq!(sigs[3], "N_256_ndensity_0.5");
    }

    #[test]
    fn jitter_collapses_after_normalisation() {
        let a = StateValue::float(0.1 + 0.2);
        let b = StateValue::float(0.3);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "0.3");
        assert_eq!(StateValue::float(-0.0).to_string(), "0");
    }

    #[test]
    fn int_and_float_denote_same_point() {
        assert_eq!(StateValue::Int(2), StateValue::float(2.0));
        assert_eq!(StateValue::Int(2).to_string(), StateValue::float(2.0).to_string());
        assert!(StateValue::float(1e9) < StateValue::text("FCC"));
    }

    #[test]
    fn large_integers_stay_distinct() {
        use std::collections::HashSet;

        let hash = |v: &StateValue| {
            let mut h = DefaultHasher::new();
            v.hash(&mut h);
            h.finish()
        };
        let low = StateValue::Int(1 << 53);
        let high = StateValue::Int((1 << 53) + 1);
        assert_ne!(low, high);
        assert!(low < high);
        let set: HashSet<_> = [low, high, StateValue::Int(i64::MAX)].into_iter().collect();
        assert_eq!(set.len(), 3);

        assert_eq!(hash(&StateValue::Int(2)), hash(&StateValue::float(2.0)));
        assert!(StateValue::Int(3) > StateValue::float(2.5));
        assert!(StateValue::float(2.5) < StateValue::Int(3));
    }

    #[test]
    fn rejects_bad_definitions() {
        assert!(StateSpace::new(vec![StateVariable::new("x", [])], 1).is_err());
        assert!(StateSpace::new(vec![StateVariable::new("x", [1.0.into()])], 0).is_err());
        assert!(StateSpace::new(vec![StateVariable::new("a/b", [1.0.into()])], 1).is_err());
        assert!(StateSpace::new(vec![StateVariable::new("x", ["../up".into()])], 1).is_err());
        assert!(StateSpace::new(
            vec![
                StateVariable::new("x", [1.0.into()]),
                StateVariable::new("x", [2.0.into()])
            ],
            1
        )
        .is_err());
    }

    #[test]
    fn snapshot_serialisation_keeps_order_and_kind() {
        let state = State::from_pairs([
            ("InitState", StateValue::text("FCC")),
            ("N", StateValue::Int(108)),
            ("ndensity", StateValue::float(0.5)),
        ]);
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"InitState":"FCC","N":108,"ndensity":0.5}"#);
        let back: State = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn non_finite_values_survive_snapshots() {
        let state = State::from_pairs([("Rso", StateValue::float(f64::INFINITY))]);
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"Rso":{"float":"inf"}}"#);
        let back: State = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert_eq!(back.signature(), "Rso_inf");
    }

    #[test]
    fn project_reorders_to_declared_variables() {
        let space = space();
        let state = State::from_pairs([
            ("extra", StateValue::text("x")),
            ("ndensity", StateValue::float(0.5)),
            ("N", StateValue::Int(108)),
        ]);
        let projected = state.project(space.variables());
        assert_eq!(projected.signature(), "N_108_ndensity_0.5");
        assert!(space.contains(&projected));
    }

    proptest! {
        #[test]
        fn prop_normalisation_is_idempotent(x in -1e12..1e12f64) {
            let once = normalize_f64(x);
            prop_assert_eq!(once.to_bits(), normalize_f64(once).to_bits());
        }

        #[test]
        fn prop_distinct_values_have_distinct_signatures(a in -1e6..1e6f64, b in -1e6..1e6f64) {
            let va = StateValue::float(a);
            let vb = StateValue::float(b);
            let sa = State::from_pairs([("x", va.clone())]).signature();
            let sb = State::from_pairs([("x", vb.clone())]).signature();
            prop_assert_eq!(va == vb, sa == sb);
        }
    }
}
