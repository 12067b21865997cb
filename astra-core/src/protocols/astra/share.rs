//! Share types of the A family.
//!
//! Every share consists of two ring slots whose meaning depends on the
//! protocol variant and the party role. The online share carries the common
//! masked value `m` and this party's negated mask; the preprocessing share
//! carries mask material only (both mask components at the dealer, the own
//! component elsewhere).

use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use num_traits::Zero;
use serde::{Deserialize, Serialize};

use super::ring::int_ring::IntRing2k;
use super::ring::ring_impl::RingElement;
use super::stream::{OctetStream, Packable};
use super::Result;

/// Raw two-slot access shared by all variants.
pub trait Share2k<T: IntRing2k>:
    Copy
    + Clone
    + std::fmt::Debug
    + Default
    + PartialEq
    + Packable
    + Add<Output = Self>
    + Sub<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + Mul<RingElement<T>, Output = Self>
    + Send
    + Sync
    + 'static
{
    /// Builds a share from its two slots.
    fn from_slots(a: RingElement<T>, b: RingElement<T>) -> Self;

    /// Slot 0.
    fn a(&self) -> RingElement<T>;

    /// Slot 1.
    fn b(&self) -> RingElement<T>;

    /// Mutable slot 0.
    fn a_mut(&mut self) -> &mut RingElement<T>;

    /// Mutable slot 1.
    fn b_mut(&mut self) -> &mut RingElement<T>;

    /// Sum of both slots. At the dealer this is the full negated mask of
    /// the sharing.
    fn sum(&self) -> RingElement<T> {
        self.a() + self.b()
    }

    /// Doubles the share.
    fn double(self) -> Self {
        self + self
    }
}

/// The behavior an online engine needs from its share type.
pub trait OnlineShare<T: IntRing2k>: Share2k<T> {
    /// Public constant as a share; opening it yields `c`.
    fn constant(c: RingElement<T>) -> Self;

    /// The masked-value component identical at both online parties.
    fn common_m(&self) -> RingElement<T>;

    /// Writes the common masked value, preserving the mask slot.
    fn set_common_m(&mut self, x: RingElement<T>);

    /// This party's negated mask share.
    fn neg_lambda(&self) -> RingElement<T>;

    /// Writes this party's negated mask share.
    fn set_neg_lambda(&mut self, x: RingElement<T>);

    /// The local multiplication kernel for online party `my_num` in {1, 2}.
    /// The kernels of the two parties add up to the Beaver-style correction
    /// exchanged in the multiplication round.
    fn local_mul(my_num: usize, x: &Self, y: &Self) -> RingElement<T>;

    /// Per-party summand for public reconstruction; the summands of both
    /// online parties add up to the cleartext.
    fn summand(&self, my_num: usize) -> RingElement<T>;

    /// The input owner's share: the broadcast masked value plus the mask
    /// drawn in preprocessing.
    fn finalize_input_mine(m: RingElement<T>, gamma: RingElement<T>) -> Self;

    /// A non-owner's share of a private input.
    fn finalize_input_other(m: RingElement<T>) -> Self;

    /// The share produced by the dealer-input protocol from the mask
    /// component read from prep.
    fn from_input0(v: RingElement<T>) -> Self;

    /// Re-encodes a share read in replicated slot order, as stored by the
    /// matching preprocessing engine.
    fn from_rep3(slots: [RingElement<T>; 2]) -> Self;

    /// The common masked value of a boolean (XOR-shared, bit-packed)
    /// share.
    fn common_m_bitwise(&self) -> RingElement<T>;
}

/// The behavior a preprocessing engine needs from its share type.
pub trait PrepShare<T: IntRing2k>: Share2k<T> {
    /// The local multiplication kernel for prep party `my_num` in {0, 1, 2}.
    fn local_mul(my_num: usize, x: &Self, y: &Self) -> RingElement<T>;

    /// Re-encodes a replicated two-slot sharing into this variant's slot
    /// order for party `my_num`.
    fn from_rep3(slots: [RingElement<T>; 2], my_num: usize) -> Self;

    /// Re-encodes a replicated boolean (XOR-shared) sharing; combination
    /// happens in the XOR group.
    fn from_rep3_bitwise(slots: [RingElement<T>; 2], my_num: usize) -> Self;
}

/// Maps this variant's slot `i` to the replicated slot index for prep party
/// `my_num`: the dealer keeps the identity, the compute parties map their
/// masked slot to their own replicated index and the mask slot to the one
/// shared with the dealer.
pub(crate) fn rep_index(i: usize, my_num: usize) -> usize {
    if my_num == 0 {
        i
    } else if i == 0 {
        my_num - 1
    } else {
        2 - my_num
    }
}

macro_rules! two_slot_share {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(bound = "")]
        pub struct $name<T: IntRing2k> {
            pub(crate) a: RingElement<T>,
            pub(crate) b: RingElement<T>,
        }

        impl<T: IntRing2k> Default for $name<T> {
            fn default() -> Self {
                Self {
                    a: RingElement::zero(),
                    b: RingElement::zero(),
                }
            }
        }

        impl<T: IntRing2k> Add for $name<T> {
            type Output = Self;

            fn add(self, rhs: Self) -> Self {
                Self {
                    a: self.a + rhs.a,
                    b: self.b + rhs.b,
                }
            }
        }

        impl<T: IntRing2k> AddAssign for $name<T> {
            fn add_assign(&mut self, rhs: Self) {
                self.a += rhs.a;
                self.b += rhs.b;
            }
        }

        impl<T: IntRing2k> Sub for $name<T> {
            type Output = Self;

            fn sub(self, rhs: Self) -> Self {
                Self {
                    a: self.a - rhs.a,
                    b: self.b - rhs.b,
                }
            }
        }

        impl<T: IntRing2k> SubAssign for $name<T> {
            fn sub_assign(&mut self, rhs: Self) {
                self.a -= rhs.a;
                self.b -= rhs.b;
            }
        }

        impl<T: IntRing2k> Neg for $name<T> {
            type Output = Self;

            fn neg(self) -> Self {
                Self {
                    a: -self.a,
                    b: -self.b,
                }
            }
        }

        impl<T: IntRing2k> Mul<RingElement<T>> for $name<T> {
            type Output = Self;

            fn mul(self, rhs: RingElement<T>) -> Self {
                Self {
                    a: self.a * rhs,
                    b: self.b * rhs,
                }
            }
        }

        impl<T: IntRing2k> Packable for $name<T> {
            const SIZE: usize = 2 * T::BYTES;

            fn pack(&self, os: &mut OctetStream) {
                self.a.pack(os);
                self.b.pack(os);
            }

            fn unpack(os: &mut OctetStream) -> Result<Self> {
                let a = RingElement::unpack(os)?;
                let b = RingElement::unpack(os)?;
                Ok(Self { a, b })
            }
        }

        impl<T: IntRing2k> Share2k<T> for $name<T> {
            fn from_slots(a: RingElement<T>, b: RingElement<T>) -> Self {
                Self { a, b }
            }

            fn a(&self) -> RingElement<T> {
                self.a
            }

            fn b(&self) -> RingElement<T> {
                self.b
            }

            fn a_mut(&mut self) -> &mut RingElement<T> {
                &mut self.a
            }

            fn b_mut(&mut self) -> &mut RingElement<T> {
                &mut self.b
            }
        }
    };
}
pub(crate) use two_slot_share;

two_slot_share! {
    /// An online share: slot 0 holds the common masked value `m`, slot 1
    /// this party's negated mask. The cleartext is `m + neg_lambda_1 +
    /// neg_lambda_2`.
    AstraShare
}

two_slot_share! {
    /// A preprocessing share: the dealer holds both mask components, a
    /// compute party holds its masked-slot contribution and its own mask
    /// component.
    AstraPrepShare
}

impl<T: IntRing2k> AstraShare<T> {
    /// The common masked value.
    pub fn m(&self) -> RingElement<T> {
        self.a
    }

    /// This party's negated mask.
    pub fn neg_lambda(&self) -> RingElement<T> {
        self.b
    }

    /// This party's mask.
    pub fn lambda(&self) -> RingElement<T> {
        -self.b
    }

    /// How a three-way replicated wire index maps into this layout for
    /// online party `my_num` in {0, 1}: index 0 is the masked value, 1 the
    /// own mask, 2 the other party's mask.
    pub fn split_index(arithmetic_index: usize, my_num: usize) -> usize {
        let res = match arithmetic_index {
            0 => 0,
            1 => my_num + 1,
            _ => 2 - my_num,
        };
        debug_assert!(res < 3);
        res
    }

    /// Every wire index is populated in the online layout.
    pub fn matters_for_split(_arithmetic_index: usize, _my_num: usize) -> bool {
        true
    }
}

impl<T: IntRing2k> OnlineShare<T> for AstraShare<T> {
    fn constant(c: RingElement<T>) -> Self {
        Self {
            a: c,
            b: RingElement::zero(),
        }
    }

    fn common_m(&self) -> RingElement<T> {
        self.a
    }

    fn set_common_m(&mut self, x: RingElement<T>) {
        self.a = x;
    }

    fn neg_lambda(&self) -> RingElement<T> {
        self.b
    }

    fn set_neg_lambda(&mut self, x: RingElement<T>) {
        self.b = x;
    }

    fn local_mul(my_num: usize, x: &Self, y: &Self) -> RingElement<T> {
        match my_num {
            1 => x.m() * y.neg_lambda() + y.m() * x.neg_lambda(),
            2 => x.m() * y.m() + Self::local_mul(1, x, y),
            _ => panic!("P0 should be absent"),
        }
    }

    fn summand(&self, my_num: usize) -> RingElement<T> {
        if my_num == 1 {
            self.m() + self.neg_lambda()
        } else {
            self.neg_lambda()
        }
    }

    fn finalize_input_mine(m: RingElement<T>, gamma: RingElement<T>) -> Self {
        Self { a: m, b: gamma }
    }

    fn finalize_input_other(m: RingElement<T>) -> Self {
        Self {
            a: m,
            b: RingElement::zero(),
        }
    }

    fn from_input0(v: RingElement<T>) -> Self {
        Self {
            a: RingElement::zero(),
            b: v,
        }
    }

    fn from_rep3(slots: [RingElement<T>; 2]) -> Self {
        Self {
            a: slots[0],
            b: slots[1],
        }
    }

    fn common_m_bitwise(&self) -> RingElement<T> {
        self.a
    }
}

impl<T: IntRing2k> AstraPrepShare<T> {
    /// This party's negated mask component.
    pub fn neg_lambda(&self) -> RingElement<T> {
        self.b
    }

    /// The full negated mask, available at the dealer only.
    pub fn neg_lambda_sum(&self) -> RingElement<T> {
        self.sum()
    }

    /// Slot mapping for the preprocessing layout; the dealer sees the two
    /// mask components directly.
    pub fn split_index(arithmetic_index: usize, my_num: usize) -> usize {
        let res = if my_num > 0 {
            AstraShare::<T>::split_index(arithmetic_index, my_num - 1)
        } else {
            (arithmetic_index + 1) % 3
        };
        debug_assert!(res < 3);
        res
    }

    /// Compute parties only carry the masked-value wire in the prep phase.
    pub fn matters_for_split(arithmetic_index: usize, my_num: usize) -> bool {
        my_num == 0 || arithmetic_index == 0
    }

    /// Constants carry no mask offset, so the prep-phase constant is the
    /// zero share.
    pub fn constant(_c: RingElement<T>) -> Self {
        Self::default()
    }
}

impl<T: IntRing2k> PrepShare<T> for AstraPrepShare<T> {
    fn local_mul(my_num: usize, x: &Self, y: &Self) -> RingElement<T> {
        match my_num {
            0 | 1 => x.sum() * y.sum(),
            _ => RingElement::zero(),
        }
    }

    fn from_rep3(slots: [RingElement<T>; 2], my_num: usize) -> Self {
        Self {
            a: slots[rep_index(0, my_num)],
            b: slots[rep_index(1, my_num)],
        }
    }

    fn from_rep3_bitwise(slots: [RingElement<T>; 2], my_num: usize) -> Self {
        <Self as PrepShare<T>>::from_rep3(slots, my_num)
    }
}
