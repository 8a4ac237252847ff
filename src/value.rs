/// Types that can live on a kernel signal. Values are stored as raw bits so the
/// kernel and the trace sinks can treat every signal uniformly.
pub trait SignalValue: Copy + PartialEq + std::fmt::Debug + Send + 'static {
    /// Width in bits, used for waveform declarations.
    const WIDTH: u32;
    fn to_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;
}

impl SignalValue for bool {
    const WIDTH: u32 = 1;
    fn to_bits(self) -> u64 {
        self as u64
    }
    fn from_bits(bits: u64) -> Self {
        bits & 1 == 1
    }
}

macro_rules! unsigned_value {
    ($($t:ty),*) => {
        $(
            impl SignalValue for $t {
                const WIDTH: u32 = <$t>::BITS;
                fn to_bits(self) -> u64 {
                    self as u64
                }
                fn from_bits(bits: u64) -> Self {
                    bits as $t
                }
            }
        )*
    };
}

unsigned_value!(u8, u16, u32, u64);
