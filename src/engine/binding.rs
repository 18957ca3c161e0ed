//! Callback sets attached to mapped codes.

pub type Callback = Box<dyn FnMut() + Send>;
pub type MoveCallback = Box<dyn FnMut(i32, i32) + Send>;

#[derive(Default)]
pub struct EdgeCallbacks {
    pub on_press: Option<Callback>,
    pub on_hold: Option<Callback>,
    pub on_release: Option<Callback>,
}

/// What runs when a mapped code changes.
///
/// Keys, buttons and gamepad controls use edge callbacks. Mouse movement
/// uses a move callback that receives the scaled delta.
pub enum Binding {
    Edge(EdgeCallbacks),
    Move(MoveCallback),
}

impl Binding {
    /// Edge binding with no callbacks yet.
    pub fn edge() -> Self {
        Binding::Edge(EdgeCallbacks::default())
    }

    pub fn movement(on_move: impl FnMut(i32, i32) + Send + 'static) -> Self {
        Binding::Move(Box::new(on_move))
    }

    /// Runs once on the released-to-held transition.
    pub fn on_press(self, f: impl FnMut() + Send + 'static) -> Self {
        self.with_edge(|callbacks| callbacks.on_press = Some(Box::new(f)))
    }

    /// Runs on every tick the input is held, including the first.
    pub fn on_hold(self, f: impl FnMut() + Send + 'static) -> Self {
        self.with_edge(|callbacks| callbacks.on_hold = Some(Box::new(f)))
    }

    /// Runs once on the held-to-released transition and on reset.
    pub fn on_release(self, f: impl FnMut() + Send + 'static) -> Self {
        self.with_edge(|callbacks| callbacks.on_release = Some(Box::new(f)))
    }

    #[inline]
    pub fn is_move(&self) -> bool {
        matches!(self, Binding::Move(_))
    }

    fn with_edge(mut self, apply: impl FnOnce(&mut EdgeCallbacks)) -> Self {
        if let Binding::Edge(callbacks) = &mut self {
            apply(callbacks);
        }
        self
    }

    pub(crate) fn fire_press(&mut self) {
        if let Binding::Edge(EdgeCallbacks {
            on_press: Some(f), ..
        }) = self
        {
            f();
        }
    }

    pub(crate) fn fire_hold(&mut self) {
        if let Binding::Edge(EdgeCallbacks {
            on_hold: Some(f), ..
        }) = self
        {
            f();
        }
    }

    pub(crate) fn fire_release(&mut self) {
        if let Binding::Edge(EdgeCallbacks {
            on_release: Some(f),
            ..
        }) = self
        {
            f();
        }
    }

    pub(crate) fn fire_move(&mut self, dx: i32, dy: i32) {
        if let Binding::Move(f) = self {
            f(dx, dy);
        }
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Edge(callbacks) => f
                .debug_struct("Edge")
                .field("on_press", &callbacks.on_press.is_some())
                .field("on_hold", &callbacks.on_hold.is_some())
                .field("on_release", &callbacks.on_release.is_some())
                .finish(),
            Binding::Move(_) => f.write_str("Move"),
        }
    }
}
