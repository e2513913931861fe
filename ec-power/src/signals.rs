use bitflags::bitflags;

bitflags! {
    /// Power-good and sleep lines sampled by the board. A set bit means the
    /// line is at its "good" level: rails report power-good, and the
    /// active-low sleep lines (`*_N`) are high, i.e. the chipset is *not*
    /// requesting that sleep state.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct PowerSignals: u16 {
        const SLP_SUS_N = 1 << 0;
        const SYSTEM_ALW_PG = 1 << 1;
        const SLP_S3_N = 1 << 2;
        const SLP_S4_N = 1 << 3;
        const ATX_PG = 1 << 4;
        const VCORE_EN = 1 << 5;
        const VRMPWRGD = 1 << 6;
        /// 3.3 V standby supply present. Checked before leaving G3.
        const V3P3_SB_PGOOD = 1 << 7;
        /// 12 V rail within tolerance, derived from the ADC reading.
        const V12_PGOOD = 1 << 8;
    }
}

impl PowerSignals {
    /// Everything the board needs to stay out of G3.
    pub const PGOOD_S5: Self = Self::SYSTEM_ALW_PG;

    /// Everything that has to be up before the PCH gets its power-good.
    pub const ALL_CORE: Self = Self::ATX_PG.union(Self::VCORE_EN).union(Self::VRMPWRGD);

    /// Signals that must be present for the board to be considered fully on
    /// when the controller restarts underneath a running host.
    pub const ALL_S0: Self = Self::PGOOD_S5.union(Self::ALL_CORE);

    pub fn has(self, required: PowerSignals) -> bool {
        self.contains(required)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PowerSignals {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "PowerSignals({=u16:#06x})", self.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_core_mask() {
        let s = PowerSignals::ATX_PG | PowerSignals::VCORE_EN;
        assert!(!s.has(PowerSignals::ALL_CORE));
        assert!((s | PowerSignals::VRMPWRGD).has(PowerSignals::ALL_CORE));
    }

    #[test]
    fn s0_requires_standby_good() {
        assert!(!PowerSignals::ALL_CORE.has(PowerSignals::ALL_S0));
        assert!(PowerSignals::all().has(PowerSignals::ALL_S0));
    }
}
