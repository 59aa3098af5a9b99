//! Fixed-size byte encoding for event records.
//!
//! Streams store raw bytes. [`EventRecord`] is the contract that lets a
//! typed value be copied into and out of a stream without `unsafe`: a
//! record has a fixed encoded size and round-trips through a byte slice
//! of exactly that size.

/// A plain value that can be copied into an event stream.
///
/// The encoding is fixed-size and little-endian for the built-in impls.
/// Streams perform no type checks: reading a slot with a different record
/// type than it was written with yields garbage, not an error.
///
/// # Example
///
/// ```
/// use ripple_core::EventRecord;
///
/// #[derive(Clone, Copy, Debug, PartialEq)]
/// struct Damage {
///     target: u32,
///     amount: f32,
/// }
///
/// impl EventRecord for Damage {
///     const SIZE: usize = 8;
///
///     fn encode(&self, out: &mut [u8]) {
///         self.target.encode(&mut out[..4]);
///         self.amount.encode(&mut out[4..8]);
///     }
///
///     fn decode(bytes: &[u8]) -> Self {
///         Self {
///             target: u32::decode(&bytes[..4]),
///             amount: f32::decode(&bytes[4..8]),
///         }
///     }
/// }
///
/// let mut buf = [0u8; Damage::SIZE];
/// let hit = Damage { target: 7, amount: 2.5 };
/// hit.encode(&mut buf);
/// assert_eq!(Damage::decode(&buf), hit);
/// ```
pub trait EventRecord: Copy + Send + Sync + 'static {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Write the encoding into `out`, which is exactly `SIZE` bytes long.
    fn encode(&self, out: &mut [u8]);

    /// Read a value back from `bytes`, which holds at least `SIZE` bytes.
    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! impl_le_record {
    ($($t:ty),* $(,)?) => {
        $(
            impl EventRecord for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn encode(&self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                fn decode(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(&bytes[..Self::SIZE]);
                    <$t>::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_le_record!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64);

impl EventRecord for bool {
    const SIZE: usize = 1;

    fn encode(&self, out: &mut [u8]) {
        out[0] = u8::from(*self);
    }

    fn decode(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

impl EventRecord for () {
    const SIZE: usize = 0;

    fn encode(&self, _out: &mut [u8]) {}

    fn decode(_bytes: &[u8]) -> Self {}
}

impl<T: EventRecord, const N: usize> EventRecord for [T; N] {
    const SIZE: usize = T::SIZE * N;

    fn encode(&self, out: &mut [u8]) {
        for (i, item) in self.iter().enumerate() {
            item.encode(&mut out[i * T::SIZE..(i + 1) * T::SIZE]);
        }
    }

    fn decode(bytes: &[u8]) -> Self {
        std::array::from_fn(|i| T::decode(&bytes[i * T::SIZE..(i + 1) * T::SIZE]))
    }
}

impl<A: EventRecord, B: EventRecord> EventRecord for (A, B) {
    const SIZE: usize = A::SIZE + B::SIZE;

    fn encode(&self, out: &mut [u8]) {
        self.0.encode(&mut out[..A::SIZE]);
        self.1.encode(&mut out[A::SIZE..A::SIZE + B::SIZE]);
    }

    fn decode(bytes: &[u8]) -> Self {
        (A::decode(&bytes[..A::SIZE]), B::decode(&bytes[A::SIZE..]))
    }
}

impl<A: EventRecord, B: EventRecord, C: EventRecord> EventRecord for (A, B, C) {
    const SIZE: usize = A::SIZE + B::SIZE + C::SIZE;

    fn encode(&self, out: &mut [u8]) {
        let (head, tail) = out.split_at_mut(A::SIZE);
        self.0.encode(head);
        let (mid, tail) = tail.split_at_mut(B::SIZE);
        self.1.encode(mid);
        self.2.encode(&mut tail[..C::SIZE]);
    }

    fn decode(bytes: &[u8]) -> Self {
        (
            A::decode(&bytes[..A::SIZE]),
            B::decode(&bytes[A::SIZE..A::SIZE + B::SIZE]),
            C::decode(&bytes[A::SIZE + B::SIZE..]),
        )
    }
}
