//! Weighted round-robin dispatch.

/// Round-robin cursor.
///
/// The current host is handed out `weight` times in a row before the cursor
/// moves on, in registration order, skipping hosts that are down.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next_host: usize,
    dispatches_on_current_host: u32,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next host index among `len` hosts.
    ///
    /// `weight_if_alive(i)` returns the weight of host `i`, or `None` when it is down.
    /// Returns `None` when every host is down.
    pub fn next_index<F>(&mut self, len: usize, weight_if_alive: F) -> Option<usize>
    where
        F: Fn(usize) -> Option<u32>,
    {
        if len == 0 {
            return None;
        }

        if self.next_host < len {
            if let Some(weight) = weight_if_alive(self.next_host) {
                if self.dispatches_on_current_host < weight {
                    self.dispatches_on_current_host += 1;
                    return Some(self.next_host);
                }
            }
        }

        // Current host exhausted its turns or went down. The current index is
        // tried last, so a lone alive host keeps being selected.
        for step in 1..=len {
            let index = (self.next_host + step) % len;
            if weight_if_alive(index).is_some() {
                self.next_host = index;
                self.dispatches_on_current_host = 1;
                return Some(index);
            }
        }
        None
    }
}
