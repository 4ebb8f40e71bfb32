use std::fmt;

/// Arbitrary-precision integer as sign plus little-endian 64-bit limbs.
/// Zero is `sign == 0` with no limbs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BigNum {
    sign: i8,
    limbs: Vec<u64>,
}

impl BigNum {
    pub fn zero() -> Self {
        Self {
            sign: 0,
            limbs: Vec::new(),
        }
    }

    pub fn from_i64(value: i64) -> Self {
        if value == 0 {
            return Self::zero();
        }
        let sign = if value < 0 { -1 } else { 1 };
        Self {
            sign,
            limbs: vec![value.unsigned_abs()],
        }
    }

    /// Parses a base-16 literal with an optional leading `-`.
    pub fn from_hex(text: &str) -> Option<Self> {
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        if digits.is_empty() {
            return None;
        }
        let mut limbs: Vec<u64> = Vec::new();
        for ch in digits.chars() {
            let digit = ch.to_digit(16)? as u64;
            mul_small_add(&mut limbs, 16, digit);
        }
        let mut out = Self {
            sign: if negative { -1 } else { 1 },
            limbs,
        };
        out.normalize();
        Some(out)
    }

    pub fn sign(&self) -> i8 {
        self.sign
    }

    pub fn limbs(&self) -> &[u64] {
        &self.limbs
    }

    pub fn is_zero(&self) -> bool {
        self.sign == 0
    }

    pub fn to_i64(&self) -> Option<i64> {
        match self.limbs.as_slice() {
            [] => Some(0),
            [mag] if self.sign > 0 => i64::try_from(*mag).ok(),
            [mag] => {
                if *mag == i64::MIN.unsigned_abs() {
                    Some(i64::MIN)
                } else {
                    i64::try_from(*mag).ok().map(|v| -v)
                }
            }
            _ => None,
        }
    }

    fn normalize(&mut self) {
        if normalize_len(&mut self.limbs) == 0 {
            self.sign = 0;
        }
    }
}

fn normalize_len(limbs: &mut Vec<u64>) -> usize {
    let mut idx = limbs.len();
    while idx > 0 && limbs[idx - 1] == 0 {
        idx -= 1;
    }
    limbs.truncate(idx);
    idx
}

fn mul_small_add(limbs: &mut Vec<u64>, mul: u64, add: u64) {
    let mut carry = add as u128;
    for limb in limbs.iter_mut() {
        let prod = (*limb as u128) * (mul as u128) + carry;
        *limb = prod as u64;
        carry = prod >> 64;
    }
    if carry != 0 {
        limbs.push(carry as u64);
    }
}

fn div_mod_mag_single(a: &[u64], divisor: u64) -> (Vec<u64>, u64) {
    let mut q = vec![0u64; a.len()];
    let mut rem = 0u128;
    for i in (0..a.len()).rev() {
        let num = (rem << 64) | (a[i] as u128);
        q[i] = (num / (divisor as u128)) as u64;
        rem = num % (divisor as u128);
    }
    normalize_len(&mut q);
    (q, rem as u64)
}

impl fmt::Display for BigNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sign == 0 {
            return f.write_str("0");
        }
        let base: u64 = 1_000_000_000;
        let mut parts: Vec<u64> = Vec::new();
        let mut temp = self.limbs.clone();
        while !temp.is_empty() {
            let (q, r) = div_mod_mag_single(&temp, base);
            parts.push(r);
            temp = q;
        }
        if self.sign < 0 {
            f.write_str("-")?;
        }
        if let Some(last) = parts.pop() {
            write!(f, "{last}")?;
        }
        for part in parts.iter().rev() {
            write!(f, "{part:09}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for BigNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BigNum({self})")
    }
}
