use object::Value;

use super::ScopeError;

/// Storage variant picked for a scope of a given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeLayout {
    NoVars,
    OneVar,
    TwoVars,
    ThreeVars,
    FourVars,
    ManyVars,
}

impl ScopeLayout {
    /// Smallest layout that holds `size` variables.
    pub const fn for_size(size: usize) -> Self {
        match size {
            0 => Self::NoVars,
            1 => Self::OneVar,
            2 => Self::TwoVars,
            3 => Self::ThreeVars,
            4 => Self::FourVars,
            _ => Self::ManyVars,
        }
    }

    /// `None` for the growable layout.
    pub const fn fixed_capacity(self) -> Option<usize> {
        match self {
            Self::NoVars => Some(0),
            Self::OneVar => Some(1),
            Self::TwoVars => Some(2),
            Self::ThreeVars => Some(3),
            Self::FourVars => Some(4),
            Self::ManyVars => None,
        }
    }
}

#[derive(Clone)]
pub(crate) struct FixedSlots<const N: usize>([Option<Value>; N]);

impl<const N: usize> FixedSlots<N> {
    fn new() -> Self {
        Self(std::array::from_fn(|_| None))
    }
}

/// Slot values of one activation. Unassigned slots are `None`.
#[derive(Clone)]
pub(crate) enum SlotValues {
    None,
    One(FixedSlots<1>),
    Two(FixedSlots<2>),
    Three(FixedSlots<3>),
    Four(FixedSlots<4>),
    Many(Vec<Option<Value>>),
}

impl SlotValues {
    pub(crate) fn with_layout(layout: ScopeLayout, size: usize) -> Self {
        match layout {
            ScopeLayout::NoVars => Self::None,
            ScopeLayout::OneVar => Self::One(FixedSlots::new()),
            ScopeLayout::TwoVars => Self::Two(FixedSlots::new()),
            ScopeLayout::ThreeVars => Self::Three(FixedSlots::new()),
            ScopeLayout::FourVars => Self::Four(FixedSlots::new()),
            ScopeLayout::ManyVars => Self::Many(vec![None; size]),
        }
    }

    pub(crate) fn layout(&self) -> ScopeLayout {
        match self {
            Self::None => ScopeLayout::NoVars,
            Self::One(_) => ScopeLayout::OneVar,
            Self::Two(_) => ScopeLayout::TwoVars,
            Self::Three(_) => ScopeLayout::ThreeVars,
            Self::Four(_) => ScopeLayout::FourVars,
            Self::Many(_) => ScopeLayout::ManyVars,
        }
    }

    pub(crate) fn as_slice(&self) -> &[Option<Value>] {
        match self {
            Self::None => &[],
            Self::One(s) => &s.0,
            Self::Two(s) => &s.0,
            Self::Three(s) => &s.0,
            Self::Four(s) => &s.0,
            Self::Many(v) => v,
        }
    }

    fn as_mut_slice(&mut self) -> &mut [Option<Value>] {
        match self {
            Self::None => &mut [],
            Self::One(s) => &mut s.0,
            Self::Two(s) => &mut s.0,
            Self::Three(s) => &mut s.0,
            Self::Four(s) => &mut s.0,
            Self::Many(v) => v,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.as_slice().len()
    }

    pub(crate) fn get(&self, offset: usize) -> Result<Option<Value>, ScopeError> {
        self.as_slice()
            .get(offset)
            .cloned()
            .ok_or(ScopeError::OutOfRange {
                offset,
                capacity: self.capacity(),
            })
    }

    pub(crate) fn slot_mut(&mut self, offset: usize) -> Result<&mut Option<Value>, ScopeError> {
        let capacity = self.capacity();
        self.as_mut_slice()
            .get_mut(offset)
            .ok_or(ScopeError::OutOfRange { offset, capacity })
    }

    /// Makes room for `required` slots. Fixed layouts never reallocate and
    /// fail if `required` exceeds what they hold.
    pub(crate) fn grow(&mut self, required: usize) -> Result<bool, ScopeError> {
        match self {
            Self::Many(values) => {
                if values.len() >= required {
                    return Ok(false);
                }
                values.resize(required, None);
                Ok(true)
            }
            fixed => {
                let capacity = fixed.capacity();
                if required > capacity {
                    return Err(ScopeError::CapacityExceeded { capacity, required });
                }
                Ok(false)
            }
        }
    }

    /// Copies `args` into slots starting at `start`.
    pub(crate) fn copy_in(&mut self, start: usize, args: &[Value]) -> Result<(), ScopeError> {
        let capacity = self.capacity();
        let end = start + args.len();
        if end > capacity {
            return Err(ScopeError::OutOfRange {
                offset: end - 1,
                capacity,
            });
        }
        for (slot, value) in self.as_mut_slice()[start..end].iter_mut().zip(args) {
            *slot = Some(value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_by_size() {
        assert_eq!(ScopeLayout::for_size(0), ScopeLayout::NoVars);
        assert_eq!(ScopeLayout::for_size(4), ScopeLayout::FourVars);
        assert_eq!(ScopeLayout::for_size(5), ScopeLayout::ManyVars);
        assert_eq!(ScopeLayout::ThreeVars.fixed_capacity(), Some(3));
        assert_eq!(ScopeLayout::ManyVars.fixed_capacity(), None);
    }

    #[test]
    fn fixed_layouts_match_growable() {
        for size in 0..=4 {
            let mut fixed = SlotValues::with_layout(ScopeLayout::for_size(size), size);
            let mut many = SlotValues::with_layout(ScopeLayout::ManyVars, size);
            assert_eq!(fixed.capacity(), many.capacity());
            for offset in 0..size {
                *fixed.slot_mut(offset).expect("fixed") = Some(Value::Fixnum(offset as i64));
                *many.slot_mut(offset).expect("many") = Some(Value::Fixnum(offset as i64));
            }
            for offset in 0..size {
                let a = fixed.get(offset).expect("fixed").expect("set");
                let b = many.get(offset).expect("many").expect("set");
                assert!(a.identical(&b));
            }
            assert!(fixed.get(size).is_err());
            assert!(many.get(size).is_err());
        }
    }

    #[test]
    fn fixed_layout_refuses_growth() {
        let mut fixed = SlotValues::with_layout(ScopeLayout::TwoVars, 2);
        assert_eq!(fixed.grow(2), Ok(false));
        assert_eq!(
            fixed.grow(3),
            Err(ScopeError::CapacityExceeded {
                capacity: 2,
                required: 3
            })
        );
    }

    #[test]
    fn copy_in_is_bounds_checked() {
        let mut slots = SlotValues::with_layout(ScopeLayout::ThreeVars, 3);
        slots
            .copy_in(1, &[Value::Fixnum(1), Value::Fixnum(2)])
            .expect("fits");
        assert!(slots.get(0).expect("slot").is_none());
        assert!(slots.copy_in(2, &[Value::Nil, Value::Nil]).is_err());
    }
}
