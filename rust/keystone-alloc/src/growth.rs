//! Slack growth: how many element slots to actually allocate.
//!
//! The calculator balances amortized growth cost against wasted memory.
//! Growing adds roughly 37.5% headroom plus a small constant, which keeps
//! repeated single-element appends amortized O(1) with a modest peak overhead.
//! Shrinking only gives memory back when the slack is large both in absolute
//! terms and relative to the container, so small containers do not thrash.
//!
//! All calculations are pure functions of their arguments and of the
//! [`GrowthPolicy`] they run on. Results are narrowed back to [`SizeType`]
//! with an always-on clamp to `SizeType::MAX` when the mathematical result
//! does not fit.

use std::sync::OnceLock;

use keystone_common::{Result, error::Error, verify_arg};
use keystone_malloc::{Malloc, SystemMalloc};
use serde::{Deserialize, Serialize};

use crate::policy::SizeType;

/// Tunables of the slack calculator.
///
/// The defaults are empirical; changing them affects memory usage and
/// reallocation frequency, never correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GrowthPolicy {
    /// Capacity of the very first allocation of a container.
    pub first_grow: usize,
    /// Constant number of slots added on every proportional grow.
    pub constant_grow: usize,
    /// Proportional headroom added on grow, as `grow_numerator / grow_denominator`.
    pub grow_numerator: usize,
    pub grow_denominator: usize,
    /// Slack at or above this many bytes is always considered excessive.
    pub shrink_slack_bytes: usize,
    /// Capacity exceeding the element count by more than this percentage is
    /// considered excessive.
    pub shrink_overhead_percent: usize,
    /// Shrinking never happens for a slack of this many elements or fewer,
    /// unless the container becomes empty.
    pub shrink_min_slack_elements: SizeType,
}

static INSTALLED_POLICY: OnceLock<GrowthPolicy> = OnceLock::new();

impl GrowthPolicy {
    pub const DEFAULT: GrowthPolicy = GrowthPolicy {
        first_grow: 4,
        constant_grow: 16,
        grow_numerator: 3,
        grow_denominator: 8,
        shrink_slack_bytes: 16384,
        shrink_overhead_percent: 50,
        shrink_min_slack_elements: 64,
    };

    /// Largest accepted `grow_numerator / grow_denominator`.
    pub const MAX_GROW_RATIO: usize = 4;

    /// Parses and validates a policy from JSON. Missing fields take their
    /// default values.
    pub fn from_json(json: &str) -> Result<GrowthPolicy> {
        let policy: GrowthPolicy =
            serde_json::from_str(json).map_err(|e| Error::json("growth policy", e))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Checks that every grow computed from this policy stays in `SizeType`
    /// unless the requested count itself is close to `SizeType::MAX`.
    ///
    /// `first_grow` and `constant_grow` must fit in a `SizeType`, and the
    /// proportional headroom is capped at [`Self::MAX_GROW_RATIO`] times the
    /// requested count.
    pub fn validate(&self) -> Result<()> {
        const MAX_COUNT: usize = SizeType::MAX as usize;
        verify_arg!(first_grow, self.first_grow > 0 && self.first_grow <= MAX_COUNT);
        verify_arg!(constant_grow, self.constant_grow <= MAX_COUNT);
        verify_arg!(
            grow_denominator,
            self.grow_denominator > 0 && self.grow_denominator <= MAX_COUNT
        );
        verify_arg!(
            grow_numerator,
            self.grow_numerator <= self.grow_denominator * Self::MAX_GROW_RATIO
        );
        verify_arg!(shrink_min_slack_elements, self.shrink_min_slack_elements >= 0);
        Ok(())
    }

    /// Installs the process-wide policy used by the allocators in this crate.
    ///
    /// This can succeed only once, and should happen at startup before any
    /// container is created: containers sized under one policy remain valid
    /// under another, but their slack would no longer be consistent.
    pub fn install(policy: GrowthPolicy) -> Result<()> {
        policy.validate()?;
        INSTALLED_POLICY
            .set(policy)
            .map_err(|_| Error::invalid_operation("install growth policy: already installed"))?;
        log::info!("installed growth policy {policy:?}");
        Ok(())
    }

    /// The installed policy, or [`GrowthPolicy::DEFAULT`] if none was installed.
    #[inline]
    pub fn current() -> &'static GrowthPolicy {
        INSTALLED_POLICY.get().unwrap_or(&Self::DEFAULT)
    }

    /// Number of slots to allocate when `element_count` elements no longer fit
    /// in `allocated_count` slots.
    ///
    /// Requires `element_count > allocated_count && element_count > 0`.
    /// With `allow_quantize`, the byte size is rounded up to what `M` would
    /// commit anyway. The result is never below `element_count`; if it would
    /// not fit in a [`SizeType`], it is `SizeType::MAX`.
    #[cfg_attr(feature = "slack-tracking", track_caller)]
    pub fn slack_grow<M: Malloc>(
        &self,
        element_count: SizeType,
        allocated_count: SizeType,
        bytes_per_element: usize,
        allow_quantize: bool,
        alignment: usize,
    ) -> SizeType {
        debug_assert!(element_count > allocated_count && element_count > 0);

        let requested = element_count as usize;
        let mut grow = self.first_grow;
        if allocated_count != 0 || requested > grow {
            grow = requested
                .saturating_add(requested.saturating_mul(self.grow_numerator) / self.grow_denominator)
                .saturating_add(self.constant_grow);
        }
        if allow_quantize {
            grow = quantize_count::<M>(grow, bytes_per_element, alignment);
        }

        let result = narrow_count(grow, element_count);
        #[cfg(feature = "slack-tracking")]
        crate::tracking::report(
            crate::tracking::SlackOp::Grow,
            element_count,
            allocated_count,
            bytes_per_element,
            result,
        );
        result
    }

    /// Number of slots to keep after the element count dropped to
    /// `element_count` while `allocated_count` slots are held.
    ///
    /// Requires `element_count < allocated_count`. Returns either
    /// `element_count` (quantized when allowed) or `allocated_count` unchanged.
    #[cfg_attr(feature = "slack-tracking", track_caller)]
    pub fn slack_shrink<M: Malloc>(
        &self,
        element_count: SizeType,
        allocated_count: SizeType,
        bytes_per_element: usize,
        allow_quantize: bool,
        alignment: usize,
    ) -> SizeType {
        debug_assert!(element_count < allocated_count);

        let count = i64::from(element_count);
        let allocated = i64::from(allocated_count);
        let slack_elements = allocated - count;
        let slack_bytes = u64::try_from(slack_elements)
            .unwrap_or(0)
            .saturating_mul(bytes_per_element as u64);

        let too_many_slack_bytes = slack_bytes >= self.shrink_slack_bytes as u64;
        let too_many_slack_elements = (allocated as i128) * 100
            > (count as i128) * (100 + self.shrink_overhead_percent as i128);
        let above_floor =
            slack_elements > i64::from(self.shrink_min_slack_elements) || element_count == 0;

        let result = if (too_many_slack_bytes || too_many_slack_elements) && above_floor {
            if element_count > 0 && allow_quantize {
                let quantized =
                    quantize_count::<M>(element_count as usize, bytes_per_element, alignment);
                narrow_count(quantized, element_count)
            } else {
                element_count
            }
        } else {
            allocated_count
        };

        #[cfg(feature = "slack-tracking")]
        crate::tracking::report(
            crate::tracking::SlackOp::Shrink,
            element_count,
            allocated_count,
            bytes_per_element,
            result,
        );
        result
    }

    /// Number of slots to allocate when exactly `element_count` elements are
    /// requested. No growth heuristic applies; only quantization.
    ///
    /// Requires `element_count > 0`.
    #[cfg_attr(feature = "slack-tracking", track_caller)]
    pub fn slack_reserve<M: Malloc>(
        &self,
        element_count: SizeType,
        bytes_per_element: usize,
        allow_quantize: bool,
        alignment: usize,
    ) -> SizeType {
        debug_assert!(element_count > 0);

        let result = if allow_quantize {
            let quantized =
                quantize_count::<M>(element_count as usize, bytes_per_element, alignment);
            narrow_count(quantized, element_count)
        } else {
            element_count
        };

        #[cfg(feature = "slack-tracking")]
        crate::tracking::report(
            crate::tracking::SlackOp::Reserve,
            element_count,
            0,
            bytes_per_element,
            result,
        );
        result
    }
}

impl Default for GrowthPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// [`GrowthPolicy::slack_grow`] with the default policy, quantizing against
/// the system allocator.
#[cfg_attr(feature = "slack-tracking", track_caller)]
pub fn calculate_slack_grow(
    element_count: SizeType,
    allocated_count: SizeType,
    bytes_per_element: usize,
    allow_quantize: bool,
    alignment: usize,
) -> SizeType {
    GrowthPolicy::DEFAULT.slack_grow::<SystemMalloc>(
        element_count,
        allocated_count,
        bytes_per_element,
        allow_quantize,
        alignment,
    )
}

/// [`GrowthPolicy::slack_shrink`] with the default policy, quantizing against
/// the system allocator.
#[cfg_attr(feature = "slack-tracking", track_caller)]
pub fn calculate_slack_shrink(
    element_count: SizeType,
    allocated_count: SizeType,
    bytes_per_element: usize,
    allow_quantize: bool,
    alignment: usize,
) -> SizeType {
    GrowthPolicy::DEFAULT.slack_shrink::<SystemMalloc>(
        element_count,
        allocated_count,
        bytes_per_element,
        allow_quantize,
        alignment,
    )
}

/// [`GrowthPolicy::slack_reserve`] with the default policy, quantizing against
/// the system allocator.
#[cfg_attr(feature = "slack-tracking", track_caller)]
pub fn calculate_slack_reserve(
    element_count: SizeType,
    bytes_per_element: usize,
    allow_quantize: bool,
    alignment: usize,
) -> SizeType {
    GrowthPolicy::DEFAULT.slack_reserve::<SystemMalloc>(
        element_count,
        bytes_per_element,
        allow_quantize,
        alignment,
    )
}

/// Rounds `count` elements up to the byte size `M` would commit, and converts
/// back to whole elements.
fn quantize_count<M: Malloc>(count: usize, bytes_per_element: usize, alignment: usize) -> usize {
    if bytes_per_element == 0 {
        return count;
    }
    match count.checked_mul(bytes_per_element) {
        Some(bytes) => M::quantize_size(bytes, alignment) / bytes_per_element,
        None => count,
    }
}

/// Narrows a slot count to [`SizeType`], clamping to `SizeType::MAX` when the
/// value overflowed or fell below the requested count.
#[inline]
fn narrow_count(count: usize, element_count: SizeType) -> SizeType {
    match SizeType::try_from(count) {
        Ok(result) if result >= element_count => result,
        _ => {
            log::warn!(
                "slack for {element_count} elements overflowed ({count}); clamping to {}",
                SizeType::MAX
            );
            SizeType::MAX
        }
    }
}
