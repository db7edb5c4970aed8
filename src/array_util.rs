use std::cmp::{Ordering};

/// Index of the element with the largest key. The first of equal keys wins;
/// keys that do not compare (NaN) never win.
pub fn array_argmax_by<T, K, F>(xs: &[T], key: F) -> Option<usize>
where K: PartialOrd, F: Fn(&T) -> K {
  let mut argmax: Option<(usize, K)> = None;
  for (j, x) in xs.iter().enumerate() {
    let k = key(x);
    let better = match argmax {
      None => k.partial_cmp(&k).is_some(),
      Some((_, ref best)) => k.partial_cmp(best) == Some(Ordering::Greater),
    };
    if better {
      argmax = Some((j, k));
    }
  }
  argmax.map(|(j, _)| j)
}

pub fn array_argmax(xs: &[f32]) -> Option<usize> {
  array_argmax_by(xs, |&x| x)
}

/// Scales `xs` to sum to one. Negative and non-finite entries become zero.
/// If nothing positive remains, `xs` becomes uniform and `false` is
/// returned.
pub fn array_normalize(xs: &mut [f32]) -> bool {
  let mut sum = 0.0;
  for x in xs.iter_mut() {
    if !x.is_finite() || *x < 0.0 {
      *x = 0.0;
    }
    sum += *x;
  }
  if sum > 0.0 {
    for x in xs.iter_mut() {
      *x /= sum;
    }
    true
  } else {
    let n = xs.len();
    for x in xs.iter_mut() {
      *x = 1.0 / n as f32;
    }
    false
  }
}
