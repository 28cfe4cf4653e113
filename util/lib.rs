/*!
Small helpers shared by the grove crates: the [`pzip`](macro.pzip.html) macro for zipping parallel iterators, and [`Finite`](finite/struct.Finite.html), a float that is guaranteed not to be NaN or infinite.
*/

#![allow(clippy::tabs_in_doc_comments)]

pub mod finite;

/**
Zip any number of values implementing `rayon::iter::IntoParallelIterator` into a single parallel iterator of tuples.

```
use grove_util::pzip;
use rayon::prelude::*;

let mut out = vec![0.0f32; 3];
let a = vec![1.0f32, 2.0, 3.0];
let b = vec![4.0f32, 5.0, 6.0];
pzip!(&mut out, &a, &b).for_each(|(out, a, b)| *out = a + b);
assert_eq!(out, vec![5.0, 7.0, 9.0]);
```
*/
#[macro_export]
macro_rules! pzip {
	($($e:expr),* $(,)*) => {
		rayon::iter::IntoParallelIterator::into_par_iter(($($e,)*))
	};
}
