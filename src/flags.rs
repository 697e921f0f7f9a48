use bitflags::bitflags;

bitflags! {
    /// Match-time options, OR-combinable (§4.9).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MatchFlags: u32 {
        /// Accept a partial match (subject exhausted mid-pattern) when no full match exists.
        const PARTIAL = 1 << 0;
        /// Disable search-mode start advancement: the match must begin at position 0.
        const FIX_LEFT = 1 << 1;
        /// Require end-of-subject at accept.
        const FIX_RIGHT = 1 << 2;
        /// `^`/`$` also match at internal newline boundaries; `.` excludes newline.
        const MULTILINE = 1 << 3;
        /// Subject and pattern are interpreted as UTF-8 rather than raw bytes.
        const UTF8 = 1 << 4;
        /// Prefer the longest full match among all backtracking alternatives.
        const LONGEST = 1 << 5;
    }
}
