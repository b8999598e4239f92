// Parameter Automation - Timed set / ramp events evaluated sample by sample

/// Interpolation shape of a ramp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RampCurve {
    #[default]
    Linear,
    /// Exponential when both endpoints are positive, linear otherwise
    Exponential,
}

/// One scheduled change to a parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Automation {
    Set { time: f64, value: f32 },
    Ramp { start: f64, duration: f64, value: f32, curve: RampCurve },
}

impl Automation {
    pub fn start(&self) -> f64 {
        match *self {
            Automation::Set { time, .. } => time,
            Automation::Ramp { start, .. } => start,
        }
    }

    pub fn value(&self) -> f32 {
        match *self {
            Automation::Set { value, .. } | Automation::Ramp { value, .. } => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ActiveRamp {
    from: f32,
    to: f32,
    start: f64,
    end: f64,
    curve: RampCurve,
}

impl ActiveRamp {
    fn value_at(&self, time: f64) -> f32 {
        if time >= self.end || self.end <= self.start {
            return self.to;
        }
        let progress = ((time - self.start) / (self.end - self.start)).clamp(0.0, 1.0) as f32;
        match self.curve {
            RampCurve::Exponential if self.from > 0.0 && self.to > 0.0 => {
                self.from * (self.to / self.from).powf(progress)
            }
            _ => self.from + (self.to - self.from) * progress,
        }
    }
}

/// Timeline for a single parameter
///
/// Events are kept sorted by start time; a new event that starts while a
/// ramp is running freezes the ramp at its current value first.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTimeline {
    value: f32,
    events: Vec<Automation>,
    cursor: usize,
    ramp: Option<ActiveRamp>,
}

impl ParamTimeline {
    pub fn new(initial: f32) -> Self {
        ParamTimeline {
            value: initial,
            events: Vec::new(),
            cursor: 0,
            ramp: None,
        }
    }

    /// Schedule an event (never before events already consumed)
    pub fn schedule(&mut self, event: Automation) {
        let start = event.start();
        let position = self
            .events
            .partition_point(|e| e.start() <= start)
            .max(self.cursor);
        self.events.insert(position, event);
    }

    /// Number of events not yet consumed
    pub fn pending(&self) -> usize {
        self.events.len() - self.cursor
    }

    /// Value after every scheduled event has run
    pub fn target(&self) -> f32 {
        self.events[self.cursor..]
            .last()
            .map(Automation::value)
            .or(self.ramp.map(|r| r.to))
            .unwrap_or(self.value)
    }

    /// Advance to `time` and return the parameter value there
    pub fn advance(&mut self, time: f64) -> f32 {
        while let Some(event) = self.events.get(self.cursor).copied() {
            if event.start() > time {
                break;
            }
            self.value = self.settled(event.start());
            self.ramp = None;
            match event {
                Automation::Set { value, .. } => self.value = value,
                Automation::Ramp { start, duration, value, curve } => {
                    self.ramp = Some(ActiveRamp {
                        from: self.value,
                        to: value,
                        start,
                        end: start + duration.max(0.0),
                        curve,
                    });
                }
            }
            self.cursor += 1;
        }
        self.settled(time)
    }

    fn settled(&self, time: f64) -> f32 {
        self.ramp.map(|r| r.value_at(time)).unwrap_or(self.value)
    }
}
