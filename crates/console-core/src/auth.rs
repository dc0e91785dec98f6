//! Challenge/response unlock for privileged console commands.
//!
//! Both sides run the same multiply-with-carry generator. The device publishes
//! its state `(z, w)`, the operator computes the next output offline and sends
//! it back.

const Z_MULTIPLIER: u32 = 36_969;
const W_MULTIPLIER: u32 = 18_000;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Certify {
    pub w: u32,
    pub z: u32,
}

impl Certify {
    pub const fn new() -> Self {
        Self { w: 0, z: 0 }
    }

    /// Stir in time-derived entropy before publishing a new challenge.
    pub fn renew(&mut self, uptime: u32, module_timer: u32) {
        self.z = self
            .z
            .wrapping_add(uptime & 0xF)
            .wrapping_add(module_timer);
    }

    /// Advance the generator and compare its output with `key`.
    pub fn unlock(&mut self, key: u32) -> bool {
        *self = self.next_state();
        self.output() == key
    }

    /// Current state, as published to the operator.
    pub const fn challenge(&self) -> (u32, u32) {
        (self.z, self.w)
    }

    /// The key that the next [`Certify::unlock`] call accepts.
    pub const fn expected_response(&self) -> u32 {
        self.next_state().output()
    }

    const fn next_state(&self) -> Self {
        Self {
            z: Z_MULTIPLIER
                .wrapping_mul(self.z & 0xFFFF)
                .wrapping_add(self.z >> 16)
                .wrapping_add(1),
            w: W_MULTIPLIER
                .wrapping_mul(self.w & 0xFFFF)
                .wrapping_add(self.w >> 16)
                .wrapping_add(1),
        }
    }

    const fn output(&self) -> u32 {
        (self.z << 16).wrapping_add(self.w)
    }
}
