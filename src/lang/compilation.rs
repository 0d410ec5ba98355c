use crate::{
    lang::source_buffer::SourceLocation,
    runtime::data_structures::word::NodeIndex,
};

/// A frame on the compile time control stack.  Each open control structure pushes one frame
/// recording either a branch site waiting to be patched, or a backward jump target.  The sites are
/// positions within the body of the word under construction, not repository indices.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ControlFrame {
    /// An open IF holding the site of its forward conditional branch.
    If { site: usize },

    /// An open ELSE holding the site of its forward unconditional branch.
    Else { site: usize },

    /// An open BEGIN holding the backward jump target.
    Begin { target: usize },

    /// An open WHILE holding the site of its forward conditional branch.  The matching BEGIN
    /// frame stays underneath until REPEAT resolves them both.
    While { site: usize },

    /// An open DO or ?DO loop.  The exits list collects the branch sites produced by EXIT inside
    /// the loop, all patched to the loop's end by LOOP or +LOOP.
    Do {
        head: usize,
        exits: Vec<usize>,
    },

    /// An open CASE collecting the exit branch sites produced by each ENDOF.
    Case { exits: Vec<usize> },

    /// An open OF holding the site of its test branch.
    Of { site: usize },
}

impl ControlFrame {
    /// A short name for the control structure, used in mismatch diagnostics.
    pub fn structure_name(&self) -> &'static str {
        match self {
            ControlFrame::If { .. } => "IF",
            ControlFrame::Else { .. } => "ELSE",
            ControlFrame::Begin { .. } => "BEGIN",
            ControlFrame::While { .. } => "WHILE",
            ControlFrame::Do { .. } => "DO",
            ControlFrame::Case { .. } => "CASE",
            ControlFrame::Of { .. } => "OF",
        }
    }
}

/// The state of the word currently being defined between `:` and `;`.  The body is a list of
/// repository handles, built up one token at a time; the control stack lives here so that a `;`
/// can verify every control structure was closed.
///
/// The word's own composite node is reserved in the repository as soon as the `:` is seen.  This
/// is what makes recursion work: the name of the word under construction resolves to this handle
/// even though the dictionary entry does not exist yet.
pub struct Construction {
    /// The name of the new word.
    pub name: String,

    /// Where in the source code the definition started.
    pub location: SourceLocation,

    /// Was the new word marked as IMMEDIATE?
    pub immediate: bool,

    /// Should the new word be left out of the WORDS listing?
    pub hidden: bool,

    /// A short comment attached to the word, shown by FIND and WORDS.
    pub comment: String,

    /// The handles making up the body compiled so far.
    pub body: Vec<NodeIndex>,

    /// Source location of each body entry, kept only for the debug tracer.
    pub locations: Vec<Option<SourceLocation>>,

    /// The stack of open control structures.
    pub controls: Vec<ControlFrame>,

    /// The repository handle reserved for this word's composite.
    pub self_index: NodeIndex,

    /// Set by DOES>, the handle of the composite holding the creation branch.  Everything
    /// compiled after DOES> accumulates in `body` and becomes the behavior branch at `;`.
    pub does_creation: Option<NodeIndex>,

    /// Repository length recorded before this definition reserved any nodes.  An error between
    /// `:` and `;` truncates the repository back to this mark.
    pub repo_mark: usize,
}

impl Construction {
    /// Start a fresh construction for a named word.
    pub fn new(
        name: String,
        location: SourceLocation,
        self_index: NodeIndex,
        repo_mark: usize,
    ) -> Construction {
        Construction {
            name,
            location,
            immediate: false,
            hidden: false,
            comment: String::new(),
            body: Vec::new(),
            locations: Vec::new(),
            controls: Vec::new(),
            self_index,
            does_creation: None,
            repo_mark,
        }
    }

    /// The body position the next compiled handle will land at.
    pub fn here(&self) -> usize {
        self.body.len()
    }

    /// Append a handle to the body being compiled.
    pub fn push(&mut self, node: NodeIndex, location: Option<SourceLocation>) {
        self.body.push(node);
        self.locations.push(location);
    }

    /// Take the body compiled so far, leaving the construction empty.  Used by DOES> to split off
    /// the creation branch and by CO_FIBER to capture its child word.
    pub fn take_body(&mut self) -> (Vec<NodeIndex>, Vec<Option<SourceLocation>>) {
        (
            std::mem::take(&mut self.body),
            std::mem::take(&mut self.locations),
        )
    }

    /// Find the innermost open DO frame, for EXIT to record its branch site on.
    pub fn innermost_do(&mut self) -> Option<&mut ControlFrame> {
        self.controls
            .iter_mut()
            .rev()
            .find(|frame| matches!(frame, ControlFrame::Do { .. }))
    }
}
