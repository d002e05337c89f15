/// Grow-only resize policy shared by every buffer type
///
/// Capacity only ever grows, and it grows to exactly the size that was
/// asked for. There is no headroom and no doubling, so a sequence of small
/// increases reallocates every time.

/// Outcome of a capacity check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeDecision {
    /// Current allocation is large enough
    Reuse,
    /// Destroy the current allocation and create one of `new_size` bytes
    Reallocate { new_size: u64 },
}

impl ResizeDecision {
    pub fn needs_reallocation(&self) -> bool {
        matches!(self, ResizeDecision::Reallocate { .. })
    }
}

/// The one resize decision used by `upload_data` and `check_for_resize`
pub struct ResizePolicy;

impl ResizePolicy {
    pub fn decide(capacity: u64, required: u64) -> ResizeDecision {
        if required <= capacity {
            ResizeDecision::Reuse
        } else {
            ResizeDecision::Reallocate { new_size: required }
        }
    }
}

#[cfg(test)]
#[path = "resize_policy_tests.rs"]
mod tests;
