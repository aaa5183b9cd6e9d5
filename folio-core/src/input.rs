//! Normalized input events and the key-to-action router.
//!
//! The frontend translates its native events into [`InputEvent`] values; the
//! router turns key presses into [`Action`]s, accumulating a numeric prefix
//! the way modal viewers do: digits build a count, the next command consumes
//! it.

use crate::view::CROP_STEP;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Up,
    Down,
    Left,
    Right,
    PageUp,
    PageDown,
    Home,
    End,
    Enter,
    Escape,
    Backspace,
    F(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub control: bool,
    pub alt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Middle,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    PointerMove { x: i32, y: i32 },
    Button { button: PointerButton, down: bool },
    Scroll { dx: i32, dy: i32 },
    Key { key: Key, mods: Modifiers },
    Resize { width: u32, height: u32 },
    /// The frontend wants the scene re-emitted without any state change.
    RefreshRequested,
}

/// Where an absolute page jump lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GotoTarget {
    First,
    Last,
    /// Zero-based page index.
    Absolute(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Quit,
    /// Relative page movement; negative is backward.
    StepPage(i64),
    Goto(GotoTarget),
    ZoomIn,
    ZoomOut,
    /// `None` restores the default resolution.
    SetZoom(Option<f32>),
    FitWidth,
    FitHeight,
    FitPage,
    /// Degrees, positive clockwise.
    Rotate(f32),
    AdjustCropX(i32),
    AdjustCropY(i32),
    ToggleInvert,
    ShuffleBackground,
    ResetView,
    ToggleOutline,
    ToggleLinks,
    ToggleInfo,
    SetMark(usize),
    PushLocation,
    RecallMark(usize),
    HistoryBack,
    HistoryForward,
    BeginSearch { direction: i8 },
    FindNext,
    FindPrevious,
    /// Scroll within the page, then across columns, then across pages.
    SmartForward,
    SmartBackward,
    /// Vertical movement by a large fraction of the viewport, crossing pages
    /// at the edges; negative is up.
    CoarseScroll(i32),
    /// Small scroll steps; page-crossing applies vertically only.
    FineScroll { dx: i32, dy: i32 },
    CancelOrClear,
}

/// Stateful key router. Digits accumulate into a count; every other
/// recognized key consumes it. Unrecognized keys also reset the count.
#[derive(Debug, Default)]
pub struct Router {
    prefix: Option<usize>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending numeric prefix, for status display.
    pub fn prefix(&self) -> Option<usize> {
        self.prefix
    }

    fn take_prefix(&mut self) -> Option<usize> {
        self.prefix.take()
    }

    /// Prefix with `1` as the bare-key default.
    fn take_count(&mut self) -> i64 {
        self.take_prefix().map_or(1, |n| n.max(1) as i64)
    }

    pub fn route(&mut self, key: Key, mods: Modifiers) -> Option<Action> {
        if let Key::Char(c) = key {
            if let Some(digit) = c.to_digit(10) {
                let prefix = self.prefix.unwrap_or(0);
                self.prefix = Some(prefix.saturating_mul(10).saturating_add(digit as usize));
                return None;
            }
        }

        if mods.alt {
            let action = match key {
                Key::F(4) => Some(Action::Quit),
                _ => None,
            };
            self.prefix = None;
            return action;
        }

        let action = match key {
            Key::Char('q') => Some(Action::Quit),

            Key::Char(',') | Key::PageUp => Some(Action::StepPage(-self.take_count())),
            Key::Char('.') | Key::PageDown => Some(Action::StepPage(self.take_count())),
            Key::Char('<') => Some(Action::StepPage(-10 * self.take_count())),
            Key::Char('>') => Some(Action::StepPage(10 * self.take_count())),

            Key::Char('g') => Some(Action::Goto(self.take_goto(GotoTarget::First))),
            Key::Char('G') => Some(Action::Goto(self.take_goto(GotoTarget::Last))),
            Key::Home => Some(Action::Goto(GotoTarget::First)),
            Key::End => Some(Action::Goto(GotoTarget::Last)),

            Key::Char('+') | Key::Char('=') => Some(Action::ZoomIn),
            Key::Char('-') => Some(Action::ZoomOut),
            Key::Char('z') => Some(Action::SetZoom(self.take_prefix().map(|n| n as f32))),
            Key::Char('W') => Some(Action::FitWidth),
            Key::Char('H') => Some(Action::FitHeight),
            Key::Char('Z') => Some(Action::FitPage),

            Key::Char('[') => Some(Action::Rotate(-0.1)),
            Key::Char(']') => Some(Action::Rotate(0.1)),
            Key::Char('{') => Some(Action::Rotate(-90.0)),
            Key::Char('}') => Some(Action::Rotate(90.0)),

            Key::Char('x') => Some(Action::AdjustCropX(CROP_STEP)),
            Key::Char('X') => Some(Action::AdjustCropX(-CROP_STEP)),
            Key::Char('y') => Some(Action::AdjustCropY(CROP_STEP)),
            Key::Char('Y') => Some(Action::AdjustCropY(-CROP_STEP)),

            Key::Char('v') => Some(Action::ToggleInvert),
            Key::Char('c') => Some(Action::ShuffleBackground),
            Key::Char('r') => Some(Action::ResetView),

            Key::Char('o') => Some(Action::ToggleOutline),
            Key::Char('L') => Some(Action::ToggleLinks),
            Key::Char('i') => Some(Action::ToggleInfo),

            Key::Char('m') => Some(match self.take_prefix() {
                Some(slot) => Action::SetMark(slot),
                None => Action::PushLocation,
            }),
            Key::Char('t') => Some(match self.take_prefix() {
                Some(slot) => Action::RecallMark(slot),
                None => Action::HistoryBack,
            }),
            Key::Char('T') => Some(Action::HistoryForward),

            Key::Char('/') => Some(Action::BeginSearch { direction: 1 }),
            Key::Char('?') => Some(Action::BeginSearch { direction: -1 }),
            Key::Char('n') => Some(Action::FindNext),
            Key::Char('N') => Some(Action::FindPrevious),

            Key::Char(' ') => Some(Action::SmartForward),
            Key::Char('b') => Some(Action::SmartBackward),
            Key::Char('u') => Some(Action::CoarseScroll(-(self.take_count() as i32))),
            Key::Char('d') => Some(Action::CoarseScroll(self.take_count() as i32)),

            Key::Char('k') | Key::Up => Some(Action::FineScroll {
                dx: 0,
                dy: -(self.take_count() as i32),
            }),
            Key::Char('j') | Key::Down => Some(Action::FineScroll {
                dx: 0,
                dy: self.take_count() as i32,
            }),
            Key::Char('h') | Key::Left => Some(Action::FineScroll {
                dx: -(self.take_count() as i32),
                dy: 0,
            }),
            Key::Char('l') | Key::Right => Some(Action::FineScroll {
                dx: self.take_count() as i32,
                dy: 0,
            }),

            Key::Escape => Some(Action::CancelOrClear),

            _ => None,
        };

        // Every non-digit key, recognized or not, consumes the prefix.
        self.prefix = None;
        action
    }

    fn take_goto(&mut self, bare: GotoTarget) -> GotoTarget {
        match self.take_prefix() {
            // Prefixes are 1-based page numbers.
            Some(n) if n >= 1 => GotoTarget::Absolute(n - 1),
            _ => bare,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(router: &mut Router, c: char) -> Option<Action> {
        router.route(Key::Char(c), Modifiers::default())
    }

    #[test]
    fn digits_accumulate_and_next_command_consumes_them() {
        let mut router = Router::new();
        assert_eq!(route(&mut router, '4'), None);
        assert_eq!(route(&mut router, '2'), None);
        assert_eq!(router.prefix(), Some(42));
        assert_eq!(route(&mut router, '.'), Some(Action::StepPage(42)));
        assert_eq!(router.prefix(), None);
        // Prefix is gone; the next step is a single page.
        assert_eq!(route(&mut router, '.'), Some(Action::StepPage(1)));
    }

    #[test]
    fn ten_page_jumps_scale_with_count() {
        let mut router = Router::new();
        route(&mut router, '3');
        assert_eq!(route(&mut router, '>'), Some(Action::StepPage(30)));
        assert_eq!(route(&mut router, '<'), Some(Action::StepPage(-10)));
    }

    #[test]
    fn goto_uses_one_based_prefix() {
        let mut router = Router::new();
        assert_eq!(route(&mut router, 'g'), Some(Action::Goto(GotoTarget::First)));
        assert_eq!(route(&mut router, 'G'), Some(Action::Goto(GotoTarget::Last)));
        route(&mut router, '7');
        assert_eq!(
            route(&mut router, 'g'),
            Some(Action::Goto(GotoTarget::Absolute(6)))
        );
        route(&mut router, '7');
        assert_eq!(
            route(&mut router, 'G'),
            Some(Action::Goto(GotoTarget::Absolute(6)))
        );
    }

    #[test]
    fn marks_require_a_digit_prefix() {
        let mut router = Router::new();
        assert_eq!(route(&mut router, 'm'), Some(Action::PushLocation));
        assert_eq!(route(&mut router, 't'), Some(Action::HistoryBack));
        route(&mut router, '3');
        assert_eq!(route(&mut router, 'm'), Some(Action::SetMark(3)));
        route(&mut router, '3');
        assert_eq!(route(&mut router, 't'), Some(Action::RecallMark(3)));
        assert_eq!(route(&mut router, 'T'), Some(Action::HistoryForward));
    }

    #[test]
    fn zoom_key_distinguishes_bare_and_prefixed() {
        let mut router = Router::new();
        assert_eq!(route(&mut router, 'z'), Some(Action::SetZoom(None)));
        route(&mut router, '1');
        route(&mut router, '4');
        route(&mut router, '4');
        assert_eq!(route(&mut router, 'z'), Some(Action::SetZoom(Some(144.0))));
    }

    #[test]
    fn unknown_key_resets_the_prefix() {
        let mut router = Router::new();
        route(&mut router, '9');
        assert_eq!(route(&mut router, '!'), None);
        assert_eq!(route(&mut router, '.'), Some(Action::StepPage(1)));
    }

    #[test]
    fn alt_f4_quits_and_alt_swallows_other_keys() {
        let mut router = Router::new();
        let alt = Modifiers {
            alt: true,
            ..Modifiers::default()
        };
        assert_eq!(router.route(Key::F(4), alt), Some(Action::Quit));
        assert_eq!(router.route(Key::Char('.'), alt), None);
    }

    #[test]
    fn arrows_match_their_letter_equivalents() {
        let mut router = Router::new();
        let none = Modifiers::default();
        assert_eq!(
            router.route(Key::Up, none),
            Some(Action::FineScroll { dx: 0, dy: -1 })
        );
        route(&mut router, '5');
        assert_eq!(
            router.route(Key::Left, none),
            Some(Action::FineScroll { dx: -5, dy: 0 })
        );
    }

    #[test]
    fn prefix_of_zero_falls_back_to_bare_behavior() {
        let mut router = Router::new();
        route(&mut router, '0');
        assert_eq!(route(&mut router, 'g'), Some(Action::Goto(GotoTarget::First)));
        route(&mut router, '0');
        assert_eq!(route(&mut router, '.'), Some(Action::StepPage(1)));
    }
}
