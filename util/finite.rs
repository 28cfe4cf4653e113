use num_traits::Float;
use thiserror::Error;

/// A float that is neither NaN nor infinite. Training loops use it to detect parameters or predictions that have blown up.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Finite<T>(T)
where
	T: Float;

#[derive(Debug, Error, PartialEq)]
#[error("not finite")]
pub struct NotFiniteError;

impl<T> Finite<T>
where
	T: Float,
{
	pub fn new(value: T) -> Result<Self, NotFiniteError> {
		if value.is_finite() {
			Ok(Self(value))
		} else {
			Err(NotFiniteError)
		}
	}
}

pub trait ToFinite<T>
where
	T: Float,
{
	/// If the value is finite, return `Ok(Finite(self))`, otherwise return `Err(NotFiniteError)`.
	fn to_finite(self) -> Result<Finite<T>, NotFiniteError>;
}

impl<T> ToFinite<T> for T
where
	T: Float,
{
	fn to_finite(self) -> Result<Finite<T>, NotFiniteError> {
		Finite::new(self)
	}
}

/// Check that every value yielded by `values` is finite.
pub fn all_finite<'a, T, I>(values: I) -> Result<(), NotFiniteError>
where
	T: Float + 'a,
	I: IntoIterator<Item = &'a T>,
{
	for value in values {
		value.to_finite()?;
	}
	Ok(())
}

#[test]
fn test_finite() {
	assert!(Finite::new(1.5f32).is_ok());
	assert_eq!(f32::NAN.to_finite(), Err(NotFiniteError));
	assert_eq!(f64::INFINITY.to_finite(), Err(NotFiniteError));
}

#[test]
fn test_all_finite() {
	assert!(all_finite(&[0.0f32, -1.0, 1e30]).is_ok());
	assert_eq!(all_finite(&[0.0f32, f32::NEG_INFINITY]), Err(NotFiniteError));
}
