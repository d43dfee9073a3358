//! Resource vectors arbitrated by the scheduler.
//!
//! A [`Resource`] carries milli-CPU, memory bytes and arbitrary named
//! scalar resources. All quantities are IEEE doubles; comparisons are
//! parameterized by a [`Tolerance`] selecting how missing dimensions and
//! floating-point slack are treated.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Result, SchedulerError};

/// Relative slack applied on the [`Tolerance::Infinity`] side of comparisons.
const EPSILON: f64 = 1e-8;

/// Quantities below this are considered exhausted when testing emptiness.
const MIN_RESOURCE: f64 = 0.1;

/// How a comparison treats dimensions the right-hand side does not define,
/// and how much floating-point slack it tolerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tolerance {
    /// Missing dimensions count as zero; comparisons are exact.
    Zero,
    /// Missing dimensions count as unbounded; comparisons tolerate a
    /// relative epsilon.
    Infinity,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub milli_cpu: f64,
    pub memory: f64,
    /// Named scalar resources (GPUs and friends). BTreeMap keeps dimension
    /// iteration deterministic across snapshots.
    #[serde(default)]
    pub scalars: BTreeMap<String, f64>,
}

impl Resource {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(milli_cpu: f64, memory: f64) -> Self {
        Self {
            milli_cpu,
            memory,
            scalars: BTreeMap::new(),
        }
    }

    pub fn with_scalar(mut self, name: impl Into<String>, quantity: f64) -> Self {
        self.scalars.insert(name.into(), quantity);
        self
    }

    /// Value of a named dimension; `cpu` and `memory` address the two real
    /// dimensions, anything else the scalar map.
    pub fn get(&self, name: &str) -> f64 {
        match name {
            "cpu" => self.milli_cpu,
            "memory" => self.memory,
            other => self.scalars.get(other).copied().unwrap_or(0.0),
        }
    }

    /// Names of every dimension this resource defines.
    pub fn resource_names(&self) -> Vec<String> {
        let mut names = vec!["cpu".to_string(), "memory".to_string()];
        names.extend(self.scalars.keys().cloned());
        names
    }

    pub fn add(&mut self, rhs: &Resource) -> &mut Self {
        self.milli_cpu += rhs.milli_cpu;
        self.memory += rhs.memory;
        for (name, quantity) in &rhs.scalars {
            *self.scalars.entry(name.clone()).or_insert(0.0) += quantity;
        }
        self
    }

    /// Subtraction that saturates each dimension at zero.
    pub fn sub(&mut self, rhs: &Resource) -> &mut Self {
        self.milli_cpu = (self.milli_cpu - rhs.milli_cpu).max(0.0);
        self.memory = (self.memory - rhs.memory).max(0.0);
        for (name, quantity) in &rhs.scalars {
            let entry = self.scalars.entry(name.clone()).or_insert(0.0);
            *entry = (*entry - quantity).max(0.0);
        }
        self
    }

    /// Subtraction that refuses to go negative in any dimension.
    pub fn try_sub(&mut self, rhs: &Resource) -> Result<&mut Self> {
        if !rhs.less_equal_in_all_dims(self, Tolerance::Infinity) {
            return Err(SchedulerError::ResourceUnderflow {
                left: format!("{self}"),
                right: format!("{rhs}"),
            });
        }
        Ok(self.sub(rhs))
    }

    pub fn multi(&mut self, ratio: f64) -> &mut Self {
        self.milli_cpu *= ratio;
        self.memory *= ratio;
        for quantity in self.scalars.values_mut() {
            *quantity *= ratio;
        }
        self
    }

    /// Elementwise minimum over the union of both dimension sets.
    pub fn min(left: &Resource, right: &Resource) -> Resource {
        let mut res = Resource::new(
            left.milli_cpu.min(right.milli_cpu),
            left.memory.min(right.memory),
        );
        for (name, quantity) in &left.scalars {
            let other = right.scalars.get(name).copied().unwrap_or(0.0);
            res.scalars.insert(name.clone(), quantity.min(other));
        }
        res
    }

    /// For every dimension the bound defines with a positive quantity, cap
    /// this resource at the bound. Dimensions the bound leaves at zero are
    /// kept untouched, so an un-requested dimension never shrinks.
    pub fn min_dimension_resource(&mut self, bound: &Resource) -> &mut Self {
        if bound.milli_cpu > 0.0 {
            self.milli_cpu = self.milli_cpu.min(bound.milli_cpu);
        }
        if bound.memory > 0.0 {
            self.memory = self.memory.min(bound.memory);
        }
        for (name, quantity) in self.scalars.iter_mut() {
            if let Some(cap) = bound.scalars.get(name) {
                if *cap > 0.0 {
                    *quantity = quantity.min(*cap);
                }
            }
        }
        self
    }

    /// Per-dimension difference, split into the increased and decreased
    /// portions relative to `other`.
    pub fn diff(&self, other: &Resource) -> (Resource, Resource) {
        let mut increased = Resource::empty();
        let mut decreased = Resource::empty();

        for name in self.union_names(other) {
            let l = self.get(&name);
            let r = other.get(&name);
            if l > r {
                increased.set(&name, l - r);
            } else if r > l {
                decreased.set(&name, r - l);
            }
        }
        (increased, decreased)
    }

    /// True when every dimension is below the exhaustion threshold.
    pub fn is_empty(&self) -> bool {
        self.milli_cpu < MIN_RESOURCE
            && self.memory < MIN_RESOURCE
            && self.scalars.values().all(|q| *q < MIN_RESOURCE)
    }

    /// `self <= other` in every dimension `self` defines. Dimensions absent
    /// from `other` default per the tolerance; `Infinity` also grants a
    /// relative epsilon of slack.
    pub fn less_equal_in_all_dims(&self, other: &Resource, tolerance: Tolerance) -> bool {
        self.dims().all(|(name, l)| {
            match dim_of(other, &name, tolerance) {
                Some(r) => less_equal_with(l, r, tolerance),
                // Missing dimension defaulted to infinity.
                None => true,
            }
        })
    }

    /// `self < other` strictly in every dimension `self` defines.
    pub fn less_in_all_dims(&self, other: &Resource, tolerance: Tolerance) -> bool {
        self.dims().all(|(name, l)| match dim_of(other, &name, tolerance) {
            Some(r) => l < r,
            None => true,
        })
    }

    fn set(&mut self, name: &str, quantity: f64) {
        match name {
            "cpu" => self.milli_cpu = quantity,
            "memory" => self.memory = quantity,
            other => {
                self.scalars.insert(other.to_string(), quantity);
            }
        }
    }

    fn dims(&self) -> impl Iterator<Item = (String, f64)> + '_ {
        [("cpu".to_string(), self.milli_cpu), ("memory".to_string(), self.memory)]
            .into_iter()
            .chain(self.scalars.iter().map(|(k, v)| (k.clone(), *v)))
    }

    fn union_names(&self, other: &Resource) -> Vec<String> {
        let mut names = self.resource_names();
        for name in other.scalars.keys() {
            if !self.scalars.contains_key(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cpu {:.0}, memory {:.0}", self.milli_cpu, self.memory)?;
        for (name, quantity) in &self.scalars {
            write!(f, ", {} {:.0}", name, quantity)?;
        }
        Ok(())
    }
}

/// Dimension lookup honoring the missing-dimension default. `None` stands
/// for an unbounded dimension.
fn dim_of(res: &Resource, name: &str, tolerance: Tolerance) -> Option<f64> {
    match name {
        "cpu" => Some(res.milli_cpu),
        "memory" => Some(res.memory),
        other => match res.scalars.get(other) {
            Some(q) => Some(*q),
            None => match tolerance {
                Tolerance::Zero => Some(0.0),
                Tolerance::Infinity => None,
            },
        },
    }
}

fn less_equal_with(l: f64, r: f64, tolerance: Tolerance) -> bool {
    match tolerance {
        Tolerance::Zero => l <= r,
        Tolerance::Infinity => l <= r + r.abs() * EPSILON + EPSILON,
    }
}

/// Dominant-resource share of `l` against `r`, with 0/0 = 0 and x/0 = 1.
pub fn share(l: f64, r: f64) -> f64 {
    if r == 0.0 {
        if l == 0.0 {
            0.0
        } else {
            1.0
        }
    } else {
        l / r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_sub_roundtrip() {
        let mut res = Resource::new(1000.0, 2048.0).with_scalar("nvidia.com/gpu", 2.0);
        let delta = Resource::new(500.0, 1024.0).with_scalar("nvidia.com/gpu", 1.0);

        res.add(&delta);
        assert_eq!(res.milli_cpu, 1500.0);
        assert_eq!(res.memory, 3072.0);
        assert_eq!(res.get("nvidia.com/gpu"), 3.0);

        res.sub(&delta);
        assert_eq!(res, Resource::new(1000.0, 2048.0).with_scalar("nvidia.com/gpu", 2.0));
    }

    #[test]
    fn sub_saturates_at_zero() {
        let mut res = Resource::new(100.0, 100.0);
        res.sub(&Resource::new(500.0, 50.0));
        assert_eq!(res.milli_cpu, 0.0);
        assert_eq!(res.memory, 50.0);
    }

    #[test]
    fn try_sub_signals_underflow() {
        let mut res = Resource::new(100.0, 100.0);
        assert!(res.try_sub(&Resource::new(500.0, 50.0)).is_err());
    }

    #[test]
    fn min_dimension_resource_keeps_unrequested_dims() {
        let mut deserved = Resource::new(3000.0, 4096.0);
        let request = Resource::new(1000.0, 0.0);
        deserved.min_dimension_resource(&request);
        assert_eq!(deserved.milli_cpu, 1000.0);
        // Memory was not requested, so it must not shrink.
        assert_eq!(deserved.memory, 4096.0);
    }

    #[test]
    fn diff_splits_increase_and_decrease() {
        let a = Resource::new(1500.0, 1024.0);
        let b = Resource::new(1000.0, 2048.0);
        let (inc, dec) = a.diff(&b);
        assert_eq!(inc.milli_cpu, 500.0);
        assert_eq!(inc.memory, 0.0);
        assert_eq!(dec.milli_cpu, 0.0);
        assert_eq!(dec.memory, 1024.0);
    }

    #[test]
    fn less_equal_missing_scalar_defaults_by_tolerance() {
        let request = Resource::new(100.0, 100.0).with_scalar("nvidia.com/gpu", 1.0);
        let capability = Resource::new(1000.0, 1000.0);

        // Capability without a gpu entry is unbounded on the infinity side...
        assert!(request.less_equal_in_all_dims(&capability, Tolerance::Infinity));
        // ...and zero on the zero side.
        assert!(!request.less_equal_in_all_dims(&capability, Tolerance::Zero));
    }

    #[test]
    fn share_handles_zero_denominator() {
        assert_eq!(share(0.0, 0.0), 0.0);
        assert_eq!(share(5.0, 0.0), 1.0);
        assert_eq!(share(1.0, 2.0), 0.5);
    }

    #[test]
    fn is_empty_tolerates_float_residue() {
        let mut res = Resource::new(0.05, 0.0001);
        assert!(res.is_empty());
        res.milli_cpu = 1.0;
        assert!(!res.is_empty());
    }
}
