//! Approximate analog response of the three front ends.
//!
//! Linear fits relating DAC settings to charge in electrons. They are
//! good enough to make threshold and ToT scans behave plausibly.

use super::matrix::FrontEnd;

/// Injection capacitance in fF.
const INJECTION_CAPACITANCE: f64 = 8.2;

/// Converts fF x mV to electrons.
const FF_MV_TO_ELECTRONS: f64 = 10.0 / 1.6;

/// Mean threshold dispersion per front end, in electrons.
pub const fn threshold_dispersion(front_end: FrontEnd) -> f64 {
    match front_end {
        FrontEnd::Sync => 30.0,
        FrontEnd::Lin => 100.0,
        FrontEnd::Diff => 240.0,
    }
}

/// Per-event pixel noise, in electrons.
pub const PIXEL_NOISE_SIGMA: f64 = 150.0;

/// Injected charge for a VCAL difference.
pub fn inj_to_charge(vcal: f64) -> f64 {
    let millivolts = -1.0 + 0.215 * vcal;
    INJECTION_CAPACITANCE * millivolts * FF_MV_TO_ELECTRONS
}

/// VCAL difference injecting `charge`.
pub fn inj_to_vcal(charge: f64) -> u32 {
    let millivolts = charge / INJECTION_CAPACITANCE / FF_MV_TO_ELECTRONS + 1.0;
    (millivolts / 0.215).max(0.0) as u32
}

/// (slope, offset) of the threshold DAC to charge relation.
fn threshold_parameters(front_end: FrontEnd) -> (f64, f64) {
    match front_end {
        FrontEnd::Sync => (10.3, -241.6),
        FrontEnd::Lin => (45.7, -15910.0),
        FrontEnd::Diff => (3.2, 298.0),
    }
}

/// Threshold in electrons for a threshold DAC setting.
pub fn thr_to_charge(vth: f64, front_end: FrontEnd) -> f64 {
    let (slope, offset) = threshold_parameters(front_end);
    offset + slope * vth
}

/// Threshold DAC setting for a threshold in electrons.
pub fn thr_to_vth(charge: f64, front_end: FrontEnd) -> u32 {
    let (slope, offset) = threshold_parameters(front_end);
    ((charge - offset) / slope).max(0.0) as u32
}

/// ToT for `charge` electrons above threshold, with the front end's
/// feedback current DAC at `dac`. Not clamped.
pub fn charge_to_tot(dac: f64, charge: f64, front_end: FrontEnd) -> f64 {
    let [p0, p1, p2, p3] = match front_end {
        FrontEnd::Sync => [-0.07, 15.6, 0.0008, 0.03],
        FrontEnd::Lin => [-0.17, 17.2, 0.0008, 0.2],
        FrontEnd::Diff => [-0.12, 18.5, 0.0004, 3.6],
    };
    (p0 * dac + p1 + p2 * charge + p3) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn injection_charge() {
        // 200 DAC counts: 42 mV on 8.2 fF
        assert!(close(inj_to_charge(200.0), 2152.5));
        assert_eq!(inj_to_vcal(inj_to_charge(200.0) + 1.0), 200);
    }

    #[test]
    fn thresholds_per_front_end() {
        assert!(close(thr_to_charge(300.0, FrontEnd::Sync), 2848.4));
        assert!(close(thr_to_charge(408.0, FrontEnd::Lin), 2735.6));
        assert!(close(thr_to_charge(1023.0, FrontEnd::Diff), 3571.6));
        assert_eq!(thr_to_vth(thr_to_charge(100.0, FrontEnd::Sync) + 1.0, FrontEnd::Sync), 100);
    }

    #[test]
    fn tot_grows_with_charge() {
        let low = charge_to_tot(140.0, 1000.0, FrontEnd::Sync);
        let high = charge_to_tot(140.0, 5000.0, FrontEnd::Sync);
        assert!(high > low);
        assert!(close(charge_to_tot(140.0, 0.0, FrontEnd::Sync), (-9.8 + 15.6 + 0.03) / 2.0));
    }
}
