use num_traits::Float;

#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub fn new(re: T, im: T) -> Self {
        Self { re, im }
    }
}

impl<T: Float> Complex<T> {
    /// Squared magnitude, the monotone proxy used for threshold comparisons
    pub fn norm_sqr(&self) -> T {
        self.re * self.re + self.im * self.im
    }

    pub fn norm(&self) -> T {
        self.re.hypot(self.im)
    }

    /// Exactly zero in both components (hardware padding)
    pub fn is_zero(&self) -> bool {
        self.re == T::zero() && self.im == T::zero()
    }

    pub fn is_finite(&self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }

    /// Point on a circle of radius `amplitude` at `phase` radians
    pub fn from_polar(amplitude: T, phase: T) -> Self {
        Self::new(amplitude * phase.cos(), amplitude * phase.sin())
    }
}

impl<T: Float> std::ops::Add for Complex<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.re + rhs.re, self.im + rhs.im)
    }
}

/// The type of raw IQ data out of the radio
pub type Sample = Complex<f32>;
