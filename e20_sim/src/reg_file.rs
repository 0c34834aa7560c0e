use crate::register::{RegId, NUM_REGS};

/// the eight 16-bit general-purpose registers. `$0` always reads as zero.
pub struct RegFile {
    inner: [u16; NUM_REGS],
}

impl RegFile {
    pub fn new() -> Self {
        Self {
            inner: [0; NUM_REGS],
        }
    }
    pub fn get(&self, id: RegId) -> u16 {
        self.inner[id.inner()]
    }
    pub fn set(&mut self, id: RegId, val: u16) {
        if !id.is_zero() {
            self.inner[id.inner()] = val;
        }
    }
    pub fn values(&self) -> &[u16; NUM_REGS] {
        &self.inner
    }
}

impl Default for RegFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_register_is_constant() {
        let mut r = RegFile::new();
        r.set(RegId::from(0), 0xBEEF);
        assert_eq!(0, r.get(RegId::from(0)));
        r.set(RegId::from(3), 0xBEEF);
        assert_eq!(0xBEEF, r.get(RegId::from(3)));
    }
}
