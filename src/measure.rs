//! Simple zero-overhead unit of measure types
//!
//! Keeps angles and distances correct by construction: latitude and longitude
//! travel as [`Degrees`], trigonometry happens in [`Radians`], and route
//! lengths are reported in [`Kilometers`].

use std::fmt::{Display, Formatter};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Sub};

use approx::{AbsDiffEq, RelativeEq, relative_eq};
use num_traits::{Float, Num};

macro_rules! unit_of_measure {
    ($u:ident, $suffix:literal) => {
        #[derive(Clone, Copy, Default, PartialEq, PartialOrd, Debug)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $u<N: Num>(pub N);

        impl<N> Add for $u<N>
        where
            N: Num + Add,
        {
            type Output = Self;

            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl<N> Sub for $u<N>
        where
            N: Num + Sub,
        {
            type Output = Self;

            fn sub(self, rhs: Self) -> Self {
                Self(self.0 - rhs.0)
            }
        }

        impl<N> AddAssign for $u<N>
        where
            N: Num + AddAssign,
        {
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }

        impl<N> Mul<N> for $u<N>
        where
            N: Num + Mul,
        {
            type Output = Self;

            fn mul(self, rhs: N) -> Self {
                Self(self.0 * rhs)
            }
        }

        impl<N> Div<N> for $u<N>
        where
            N: Num + Div,
        {
            type Output = Self;

            fn div(self, rhs: N) -> Self {
                Self(self.0 / rhs)
            }
        }

        impl<N> Sum for $u<N>
        where
            N: Num,
        {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                iter.fold(Self(N::zero()), |acc, x| Self(acc.0 + x.0))
            }
        }

        impl<T> Display for $u<T>
        where
            T: Num + Display,
        {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                match f.precision() {
                    Some(p) => write!(f, "{:.*}{}", p, self.0, $suffix),
                    None => write!(f, "{}{}", self.0, $suffix),
                }
            }
        }

        // Relative equality traits for appox support

        impl<N> AbsDiffEq for $u<N>
        where
            N: Num + Float + AbsDiffEq<N, Epsilon = N>,
        {
            type Epsilon = N;

            fn default_epsilon() -> Self::Epsilon {
                N::epsilon()
            }

            fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
                self.0.abs_diff_eq(&other.0, epsilon)
            }
        }

        impl<N> RelativeEq for $u<N>
        where
            N: Num + Float + AbsDiffEq<N, Epsilon = N> + RelativeEq<N>,
        {
            fn default_max_relative() -> Self::Epsilon {
                N::epsilon()
            }

            fn relative_eq(
                &self,
                other: &Self,
                epsilon: Self::Epsilon,
                max_relative: Self::Epsilon,
            ) -> bool {
                relative_eq!(
                    self.0,
                    other.0,
                    epsilon = epsilon,
                    max_relative = max_relative
                )
            }
        }
    };
}

// Angular units:
unit_of_measure![Degrees, "°"];
unit_of_measure![Radians, " rad"];

// Distance units:
unit_of_measure![Meters, " m"];
unit_of_measure![Kilometers, " km"];

impl<N> From<Degrees<N>> for Radians<N>
where
    N: Num + Float,
{
    fn from(value: Degrees<N>) -> Self {
        Radians(value.0.to_radians())
    }
}

impl<N> From<Radians<N>> for Degrees<N>
where
    N: Num + Float,
{
    fn from(value: Radians<N>) -> Self {
        Degrees(value.0.to_degrees())
    }
}

impl<N> From<Kilometers<N>> for Meters<N>
where
    N: Num + From<u16>,
{
    fn from(value: Kilometers<N>) -> Meters<N> {
        Meters(N::from(1000u16) * value.0)
    }
}

impl<N> From<Meters<N>> for Kilometers<N>
where
    N: Num + From<u16>,
{
    fn from(value: Meters<N>) -> Kilometers<N> {
        Kilometers(value.0 / N::from(1000u16))
    }
}

impl<N> Radians<N>
where
    N: Num + Float,
{
    pub fn sin(self) -> N {
        self.0.sin()
    }

    pub fn cos(self) -> N {
        self.0.cos()
    }
}
