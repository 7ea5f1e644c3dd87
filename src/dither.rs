use std::str::FromStr;

use rand::rngs::ThreadRng;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DitherType {
    Tpdf,
    Rectangular,
    None,
}

impl FromStr for DitherType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "t" | "tpdf" => Ok(DitherType::Tpdf),
            "r" | "rect" | "rectangular" => Ok(DitherType::Rectangular),
            "x" | "none" => Ok(DitherType::None),
            _ => Err("Invalid dither type; must be T, R, or X".to_string()),
        }
    }
}

/// Noise added ahead of integer quantization. Samples are expected to be
/// scaled so that 1.0 equals one LSB.
pub struct Dither {
    dither_type: DitherType,
    rng: ThreadRng,
}

impl Dither {
    pub fn new(dither_type: DitherType) -> Self {
        Self {
            dither_type,
            rng: rand::thread_rng(),
        }
    }

    pub fn process_samp(&mut self, sample: &mut f64) {
        match self.dither_type {
            DitherType::Tpdf => *sample += self.process_tpdf(),
            DitherType::Rectangular => *sample += self.process_rpdf(),
            DitherType::None => (),
        }
    }

    fn process_tpdf(&mut self) -> f64 {
        // Triangular PDF dither with 1 LSB peak-to-peak amplitude
        let r1 = self.rng.gen::<f64>();
        let r2 = self.rng.gen::<f64>();
        (r1 - r2) * 0.5
    }

    fn process_rpdf(&mut self) -> f64 {
        self.rng.gen::<f64>() - 0.5
    }

    pub fn dither_type(&self) -> DitherType {
        self.dither_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_transparent() {
        let mut dither = Dither::new(DitherType::None);
        let mut s = 12.25;
        dither.process_samp(&mut s);
        assert_eq!(s, 12.25);
    }

    #[test]
    fn noise_stays_within_half_lsb() {
        for kind in [DitherType::Tpdf, DitherType::Rectangular] {
            let mut dither = Dither::new(kind);
            for _ in 0..10_000 {
                let mut s = 0.0;
                dither.process_samp(&mut s);
                assert!(s.abs() <= 0.5, "{:?} produced {}", kind, s);
            }
        }
    }

    #[test]
    fn parses_cli_letters() {
        assert_eq!("T".parse::<DitherType>().unwrap(), DitherType::Tpdf);
        assert_eq!("r".parse::<DitherType>().unwrap(), DitherType::Rectangular);
        assert_eq!("x".parse::<DitherType>().unwrap(), DitherType::None);
        assert!("f".parse::<DitherType>().is_err());
    }
}
