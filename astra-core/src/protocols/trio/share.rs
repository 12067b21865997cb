//! Share types of the T family.
//!
//! Slot 0 holds `common_m + neg_lambda` at each compute party, so the
//! common masked value is recovered as the slot difference and the opening
//! summands are simply the two distinct slots.

use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::protocols::astra::ring::int_ring::IntRing2k;
use crate::protocols::astra::ring::ring_impl::RingElement;
use crate::protocols::astra::share::{
    rep_index, two_slot_share, AstraShare, OnlineShare, PrepShare, Share2k,
};
use crate::protocols::astra::stream::{OctetStream, Packable};
use crate::protocols::astra::Result;

two_slot_share! {
    /// A T-family online share: slot 0 is `common_m + neg_lambda`, slot 1
    /// this party's negated mask.
    TrioShare
}

two_slot_share! {
    /// A T-family preprocessing share; the dealer combines both slot
    /// differences in its multiplication kernel, the compute parties are
    /// pure correlation producers.
    TrioPrepShare
}

impl<T: IntRing2k> TrioShare<T> {
    /// The masked-value component identical at both parties.
    pub fn common_m(&self) -> RingElement<T> {
        self.a - self.b
    }

    /// This party's negated mask.
    pub fn neg_lambda(&self) -> RingElement<T> {
        self.b
    }

    /// This party's mask.
    pub fn lambda(&self) -> RingElement<T> {
        -self.b
    }

    /// The replicated two-slot view: the common masked value and the mask
    /// slot.
    pub fn to_rep3(&self) -> [RingElement<T>; 2] {
        [self.common_m(), self.b]
    }

    /// The wire value for replicated index `i`.
    pub fn for_split(&self, i: usize) -> RingElement<T> {
        if i == 0 {
            self.common_m()
        } else {
            self.b
        }
    }

    /// Local logical right shift through the replicated view.
    pub fn shr_rep3(&self, n: usize) -> Self {
        let rep = self.to_rep3();
        <Self as OnlineShare<T>>::from_rep3([rep[0] >> n, rep[1] >> n])
    }
}

impl<T: IntRing2k> OnlineShare<T> for TrioShare<T> {
    fn constant(c: RingElement<T>) -> Self {
        Self {
            a: c,
            b: RingElement::zero(),
        }
    }

    fn common_m(&self) -> RingElement<T> {
        TrioShare::common_m(self)
    }

    fn set_common_m(&mut self, x: RingElement<T>) {
        self.a = x + self.b;
    }

    fn neg_lambda(&self) -> RingElement<T> {
        self.b
    }

    fn set_neg_lambda(&mut self, x: RingElement<T>) {
        self.b = x;
    }

    fn local_mul(my_num: usize, x: &Self, y: &Self) -> RingElement<T> {
        match my_num {
            1 => x.a * y.lambda() + y.a * x.lambda(),
            2 => x.a * y.a,
            _ => panic!("P0 should be absent"),
        }
    }

    fn summand(&self, my_num: usize) -> RingElement<T> {
        if my_num == 1 {
            self.a
        } else {
            self.b
        }
    }

    fn finalize_input_mine(m: RingElement<T>, gamma: RingElement<T>) -> Self {
        Self {
            a: m + gamma,
            b: gamma,
        }
    }

    fn finalize_input_other(m: RingElement<T>) -> Self {
        Self {
            a: m,
            b: RingElement::zero(),
        }
    }

    fn from_input0(v: RingElement<T>) -> Self {
        <Self as OnlineShare<T>>::from_rep3([RingElement::zero(), v])
    }

    fn from_rep3(slots: [RingElement<T>; 2]) -> Self {
        Self {
            a: slots[0] + slots[1],
            b: slots[1],
        }
    }

    fn common_m_bitwise(&self) -> RingElement<T> {
        self.a ^ self.b
    }
}

impl<T: IntRing2k> TrioPrepShare<T> {
    /// This party's negated mask component.
    pub fn neg_lambda(&self) -> RingElement<T> {
        self.b
    }

    /// The full negated mask, available at the dealer only.
    pub fn neg_lambda_sum(&self) -> RingElement<T> {
        self.sum()
    }

    /// Constants carry no mask offset.
    pub fn constant(_c: RingElement<T>) -> Self {
        Self::default()
    }

    /// Slot mapping, as in the base preprocessing layout.
    pub fn split_index(arithmetic_index: usize, my_num: usize) -> usize {
        crate::protocols::astra::share::AstraPrepShare::<T>::split_index(arithmetic_index, my_num)
    }

    /// Compute parties only carry the masked-value wire in the prep phase.
    pub fn matters_for_split(arithmetic_index: usize, my_num: usize) -> bool {
        crate::protocols::astra::share::AstraPrepShare::<T>::matters_for_split(
            arithmetic_index,
            my_num,
        )
    }
}

impl<T: IntRing2k> PrepShare<T> for TrioPrepShare<T> {
    fn local_mul(my_num: usize, x: &Self, y: &Self) -> RingElement<T> {
        match my_num {
            0 => x.b * y.b - (x.a - x.b) * (y.a - y.b),
            _ => RingElement::zero(),
        }
    }

    fn from_rep3(slots: [RingElement<T>; 2], my_num: usize) -> Self {
        let mut res = Self {
            a: slots[rep_index(0, my_num)],
            b: slots[rep_index(1, my_num)],
        };
        if my_num > 0 {
            res.a += res.b;
        }
        res
    }

    fn from_rep3_bitwise(slots: [RingElement<T>; 2], my_num: usize) -> Self {
        let mut res = Self {
            a: slots[rep_index(0, my_num)],
            b: slots[rep_index(1, my_num)],
        };
        if my_num > 0 {
            res.a ^= res.b;
        }
        res
    }
}

/// The A-family online layout re-encoded into the T layout, used when a
/// share produced under the base convention enters a T computation.
pub fn from_astra<T: IntRing2k>(share: AstraShare<T>) -> TrioShare<T> {
    <TrioShare<T> as OnlineShare<T>>::from_rep3([share.a(), share.b()])
}
