/// Visibility state for an object whose pose is derived from a trackable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Source trackable not visible, content hidden
    #[default]
    Hidden,
    /// Source trackable visible, pose applied every frame
    Visible,
    /// Source lost, stale content still shown within the grace window
    VisibleRemaining,
}

impl Visibility {
    /// Whether content keyed to this state should currently be shown.
    #[inline]
    pub fn shows_content(self) -> bool {
        !matches!(self, Visibility::Hidden)
    }
}
