use num_rational::Ratio;
use num_traits::ToPrimitive;

/// Exact musical duration, in whole notes. `Ratio` keeps values reduced to
/// lowest terms, so repeated tempo changes never accumulate error in this
/// unit.
pub type Fraction = Ratio<i64>;

/// 120 quarter notes per minute, the SMF default when no tempo event occurs.
pub const DEFAULT_TEMPO: u32 = 500_000;

/// The file-level timing reference: how many ticks make up a quarter note or
/// a second. Derived once from the SMF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeDivision {
    /// Metrical timing: ticks per quarter note.
    PulsesPerQuarter(u16),
    /// SMPTE timing: ticks per second, from frame rate x ticks-per-frame.
    TicksPerSecond(Fraction),
}

impl TimeDivision {
    pub fn from_timing(timing: midly::Timing) -> Self {
        match timing {
            midly::Timing::Metrical(ppq) => TimeDivision::PulsesPerQuarter(ppq.as_int()),
            midly::Timing::Timecode(fps, ticks_per_frame) => {
                let frame_rate = match fps {
                    midly::Fps::Fps24 => Fraction::from_integer(24),
                    midly::Fps::Fps25 => Fraction::from_integer(25),
                    // NTSC drop-frame: nominally 30 fps, actually 30000/1001
                    midly::Fps::Fps29 => Fraction::new(30_000, 1001),
                    midly::Fps::Fps30 => Fraction::from_integer(30),
                };
                TimeDivision::TicksPerSecond(
                    frame_rate * Fraction::from_integer(ticks_per_frame as i64),
                )
            }
        }
    }

    /// Conversion ratios in force under `tempo` microseconds per quarter:
    /// whole notes per tick and seconds per tick.
    pub fn ratios(&self, tempo: u32) -> (Fraction, f64) {
        match *self {
            TimeDivision::PulsesPerQuarter(ppq) => {
                let ppq = ppq as i64;
                let wholes = Fraction::new(1, 4 * ppq);
                let seconds = tempo as f64 / (1_000_000.0 * ppq as f64);
                (wholes, seconds)
            }
            TimeDivision::TicksPerSecond(tps) => {
                let wholes =
                    Fraction::from_integer(250_000) / (tps * Fraction::from_integer(tempo as i64));
                let seconds = 1.0 / tps.to_f64().unwrap_or(f64::MAX);
                (wholes, seconds)
            }
        }
    }
}

/// Piecewise-linear clock over absolute ticks.
///
/// Maintains one affine segment `offset + slope * tick` per derived unit
/// (whole notes, seconds). [`TimeCursor::set_tempo`] swaps the slopes and
/// picks new offsets so both mappings stay continuous at the change tick:
/// re-reading a position immediately after a tempo change yields the value
/// it had immediately before.
#[derive(Debug, Clone)]
pub struct TimeCursor {
    division: TimeDivision,
    tick: u64,
    wholes_offset: Fraction,
    wholes_slope: Fraction,
    seconds_offset: f64,
    seconds_slope: f64,
}

impl TimeCursor {
    pub fn new(division: TimeDivision) -> Self {
        let (wholes_slope, seconds_slope) = division.ratios(DEFAULT_TEMPO);
        Self {
            division,
            tick: 0,
            wholes_offset: Fraction::from_integer(0),
            wholes_slope,
            seconds_offset: 0.0,
            seconds_slope,
        }
    }

    /// Move the clock to an absolute tick. Ticks never move backwards in a
    /// merged stream, so no segment bookkeeping is needed here.
    pub fn advance_to(&mut self, tick: u64) {
        self.tick = tick;
    }

    /// Begin a new tempo segment at the current tick.
    pub fn set_tempo(&mut self, tempo: u32) {
        let tick_wholes = Fraction::from_integer(self.tick as i64);
        let wholes_now = self.wholes();
        let seconds_now = self.seconds();

        let (wholes_slope, seconds_slope) = self.division.ratios(tempo);
        self.wholes_offset = wholes_now - wholes_slope * tick_wholes;
        self.wholes_slope = wholes_slope;
        self.seconds_offset = seconds_now - seconds_slope * self.tick as f64;
        self.seconds_slope = seconds_slope;
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// Current position in whole notes, exact.
    pub fn wholes(&self) -> Fraction {
        self.wholes_offset + self.wholes_slope * Fraction::from_integer(self.tick as i64)
    }

    /// Current position in seconds.
    pub fn seconds(&self) -> f64 {
        self.seconds_offset + self.seconds_slope * self.tick as f64
    }
}
