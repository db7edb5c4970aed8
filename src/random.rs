use rand::{Error, Rng, RngCore, SeedableRng};
use rand::distributions::{Uniform, Distribution};

pub fn random_shuffle<T, R: Rng>(xs: &mut [T], rng: &mut R) {
  // Fisher-Yates shuffle.
  let n = xs.len();
  for i in 0 .. n {
    let j = Uniform::new(i, n).sample(rng);
    xs.swap(i, j);
  }
}

/// Samples an index with probability proportional to `weights[j]`. Negative
/// and non-finite weights count as zero. Returns `None` when every weight is
/// zero.
pub fn choose_weighted<R: Rng>(weights: &[f32], rng: &mut R) -> Option<usize> {
  let mut total = 0.0_f64;
  for &w in weights.iter() {
    if w.is_finite() && w > 0.0 {
      total += w as f64;
    }
  }
  if !(total > 0.0) {
    return None;
  }
  let u = rng.gen::<f64>() * total;
  let mut acc = 0.0_f64;
  let mut last = None;
  for (j, &w) in weights.iter().enumerate() {
    if w.is_finite() && w > 0.0 {
      acc += w as f64;
      last = Some(j);
      if u < acc {
        return Some(j);
      }
    }
  }
  // XXX: Only reachable through rounding at the top of the range.
  last
}

#[derive(Clone, Debug)]
pub struct XorShift128PlusRng {
  state: [u64; 2],
}

impl XorShift128PlusRng {
  pub fn from_state(state: [u64; 2]) -> XorShift128PlusRng {
    let mut rng = XorShift128PlusRng{
      state: state,
    };
    // The all-zero state is a fixed point.
    if rng.state == [0, 0] {
      rng.state[1] = 0x9e37_79b9_7f4a_7c15;
    }
    rng
  }
}

impl RngCore for XorShift128PlusRng {
  fn next_u64(&mut self) -> u64 {
    let mut s1 = self.state[0];
    let s0 = self.state[1];
    self.state[0] = s0;
    s1 ^= s1 << 23;
    s1 = s1 ^ s0 ^ (s1 >> 17) ^ (s0 >> 26);
    self.state[1] = s1;
    s1.wrapping_add(s0)
  }

  fn next_u32(&mut self) -> u32 {
    (self.next_u64() >> 32) as u32
  }

  fn fill_bytes(&mut self, dest: &mut [u8]) {
    for chunk in dest.chunks_mut(8) {
      let x = self.next_u64().to_le_bytes();
      let n = chunk.len();
      chunk.copy_from_slice(&x[.. n]);
    }
  }

  fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
    self.fill_bytes(dest);
    Ok(())
  }
}

impl SeedableRng for XorShift128PlusRng {
  type Seed = [u8; 16];

  fn from_seed(seed: [u8; 16]) -> XorShift128PlusRng {
    let mut lo = [0_u8; 8];
    let mut hi = [0_u8; 8];
    lo.copy_from_slice(&seed[.. 8]);
    hi.copy_from_slice(&seed[8 ..]);
    XorShift128PlusRng::from_state([u64::from_le_bytes(lo), u64::from_le_bytes(hi)])
  }
}
