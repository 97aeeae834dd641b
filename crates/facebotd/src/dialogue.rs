//! Per-chat conversation state.
//!
//! A chat is either idle, waiting for a photo to use for one of the photo
//! actions, or waiting for the name of a face it has just captured. The
//! transport feeds text and photos in; the returned replies say what to do.

use facebot_core::Embedding;
use image::RgbImage;

pub const ADD_FACE: &str = "Add face";
pub const RECOGNIZE: &str = "Recognize";
pub const LOOKALIKE: &str = "Celebrity lookalike";
pub const VISUALIZE: &str = "Visualize";
pub const LIST_FACES: &str = "List faces";
pub const CLEAR_FACES: &str = "Clear faces";

/// Keyboard layout, one inner slice per row.
pub const MENU_ROWS: [&[&str]; 3] = [
    &[ADD_FACE, RECOGNIZE],
    &[LOOKALIKE, VISUALIZE],
    &[LIST_FACES, CLEAR_FACES],
];

pub const CHOOSE_OPTION: &str = "Choose an option:";
pub const INVALID_OPTION: &str = "Please choose a valid option.";
pub const CHOOSE_FIRST: &str = "Choose an option first, then send the photo.";
pub const ASK_NAME: &str = "Got it. What is this person's name?";
pub const ASK_NAME_AGAIN: &str = "Please send a name for this face (plain text).";
pub const NO_FACE: &str = "I couldn't find a face in that photo. Try another one.";

/// What a photo will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoAction {
    AddFace,
    Recognize,
    Lookalike,
    Visualize,
}

impl PhotoAction {
    fn from_button(text: &str) -> Option<Self> {
        match text {
            ADD_FACE => Some(Self::AddFace),
            RECOGNIZE => Some(Self::Recognize),
            LOOKALIKE => Some(Self::Lookalike),
            VISUALIZE => Some(Self::Visualize),
            _ => None,
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            Self::AddFace => {
                "Send a photo of the person to add. If there are several faces, \
                 the most prominent one is used."
            }
            Self::Recognize => "Send a photo and I'll mark the faces I know.",
            Self::Lookalike => "Send a photo and I'll find the closest celebrity.",
            Self::Visualize => {
                "Send a photo and I'll map its faces next to the known and celebrity faces."
            }
        }
    }
}

/// A photo action as armed by one particular menu press.
///
/// Pressing a button again arms a new generation, so work started for an
/// earlier press cannot reset the chat once it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Armed {
    pub action: PhotoAction,
    generation: u64,
}

/// A face waiting for its name.
#[derive(Debug, Clone)]
pub struct PendingFace {
    pub embedding: Embedding,
    pub thumbnail: RgbImage,
}

#[derive(Debug, Clone, Default)]
pub enum State {
    #[default]
    Idle,
    AwaitingPhoto(Armed),
    AwaitingName(PendingFace),
}

/// What the transport should do in response to a text message.
#[derive(Debug)]
pub enum TextReply {
    /// Send this text together with the menu keyboard.
    Menu(&'static str),
    /// Send this text as is.
    Prompt(&'static str),
    ListFaces,
    ClearFaces,
    SaveFace { name: String, face: PendingFace },
}

#[derive(Debug, Default)]
pub struct Dialogue {
    state: State,
    presses: u64,
}

/// The command word of a message: `/start@SomeBot payload` becomes `/start`.
fn command(text: &str) -> Option<&str> {
    if !text.starts_with('/') {
        return None;
    }
    let word = text.split_whitespace().next().unwrap_or(text);
    Some(word.split('@').next().unwrap_or(word))
}

impl Dialogue {
    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn on_text(&mut self, text: &str) -> TextReply {
        let text = text.trim();

        if matches!(command(text), Some("/start" | "/help")) {
            self.state = State::Idle;
            return TextReply::Menu(CHOOSE_OPTION);
        }
        if let Some(action) = PhotoAction::from_button(text) {
            self.presses += 1;
            self.state = State::AwaitingPhoto(Armed { action, generation: self.presses });
            return TextReply::Prompt(action.prompt());
        }
        match text {
            LIST_FACES => return TextReply::ListFaces,
            CLEAR_FACES => {
                if matches!(self.state, State::AwaitingName(_)) {
                    self.state = State::Idle;
                }
                return TextReply::ClearFaces;
            }
            _ => {}
        }

        match std::mem::take(&mut self.state) {
            State::AwaitingName(face) => {
                if text.is_empty() || text.starts_with('/') {
                    self.state = State::AwaitingName(face);
                    TextReply::Prompt(ASK_NAME_AGAIN)
                } else {
                    TextReply::SaveFace { name: text.to_string(), face }
                }
            }
            other => {
                self.state = other;
                TextReply::Menu(INVALID_OPTION)
            }
        }
    }

    /// The armed action a newly arrived photo is for, if any. Does not change state.
    pub fn on_photo(&self) -> Option<Armed> {
        match self.state {
            State::AwaitingPhoto(armed) => Some(armed),
            _ => None,
        }
    }

    fn still_armed(&self, armed: Armed) -> bool {
        matches!(self.state, State::AwaitingPhoto(current) if current == armed)
    }

    /// The photo for `armed` had no face. State is left alone, so a chat
    /// still armed for that action takes the next photo the same way.
    pub fn no_face(&self, armed: Armed) -> &'static str {
        tracing::debug!(
            action = ?armed.action,
            still_armed = self.still_armed(armed),
            "no face in photo"
        );
        NO_FACE
    }

    /// A face was captured for `Add face`; wait for its name.
    ///
    /// Returns false if the chat moved on while the photo was being analyzed.
    pub fn face_captured(&mut self, armed: Armed, face: PendingFace) -> bool {
        if armed.action == PhotoAction::AddFace && self.still_armed(armed) {
            self.state = State::AwaitingName(face);
            true
        } else {
            false
        }
    }

    /// A photo action finished; go back to idle unless the chat moved on.
    pub fn complete(&mut self, armed: Armed) {
        if self.still_armed(armed) {
            self.state = State::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> PendingFace {
        PendingFace { embedding: Embedding::new(vec![1.0, 0.0]), thumbnail: RgbImage::new(2, 2) }
    }

    fn armed_action(d: &Dialogue) -> Option<PhotoAction> {
        d.on_photo().map(|armed| armed.action)
    }

    #[test]
    fn test_start_resets_to_idle() {
        let mut d = Dialogue::default();
        d.on_text(RECOGNIZE);
        assert!(matches!(d.on_text("/start"), TextReply::Menu(CHOOSE_OPTION)));
        assert!(matches!(d.state(), State::Idle));
    }

    #[test]
    fn test_start_with_bot_suffix_and_payload() {
        let mut d = Dialogue::default();
        for text in ["/start@FaceBot", "/start deep-link", "/help@FaceBot now"] {
            d.on_text(RECOGNIZE);
            assert!(matches!(d.on_text(text), TextReply::Menu(CHOOSE_OPTION)), "{text}");
            assert!(matches!(d.state(), State::Idle), "{text}");
        }
        assert!(matches!(d.on_text("/stop@FaceBot"), TextReply::Menu(INVALID_OPTION)));
    }

    #[test]
    fn test_command_word() {
        assert_eq!(command("/start@FaceBot"), Some("/start"));
        assert_eq!(command("/help   extra words"), Some("/help"));
        assert_eq!(command("start"), None);
    }

    #[test]
    fn test_menu_buttons_arm_photo_actions() {
        let mut d = Dialogue::default();
        for (button, action) in [
            (ADD_FACE, PhotoAction::AddFace),
            (RECOGNIZE, PhotoAction::Recognize),
            (LOOKALIKE, PhotoAction::Lookalike),
            (VISUALIZE, PhotoAction::Visualize),
        ] {
            assert!(matches!(d.on_text(button), TextReply::Prompt(_)));
            assert_eq!(armed_action(&d), Some(action));
        }
    }

    #[test]
    fn test_photo_while_idle_has_no_action() {
        let d = Dialogue::default();
        assert_eq!(d.on_photo(), None);
    }

    #[test]
    fn test_add_face_flow() {
        let mut d = Dialogue::default();
        d.on_text(ADD_FACE);
        let armed = d.on_photo().expect("armed");
        assert_eq!(armed.action, PhotoAction::AddFace);
        assert!(d.face_captured(armed, pending()));
        assert_eq!(d.on_photo(), None);

        assert!(matches!(d.on_text("   "), TextReply::Prompt(ASK_NAME_AGAIN)));
        assert!(matches!(d.on_text("/weird"), TextReply::Prompt(ASK_NAME_AGAIN)));
        match d.on_text("  Ada Lovelace ") {
            TextReply::SaveFace { name, .. } => assert_eq!(name, "Ada Lovelace"),
            other => panic!("expected SaveFace, got {other:?}"),
        }
        assert!(matches!(d.state(), State::Idle));
    }

    #[test]
    fn test_no_face_keeps_waiting_for_photo() {
        for button in [ADD_FACE, RECOGNIZE, LOOKALIKE, VISUALIZE] {
            let mut d = Dialogue::default();
            d.on_text(button);
            let armed = d.on_photo().expect("armed");
            assert_eq!(d.no_face(armed), NO_FACE);
            assert_eq!(d.on_photo(), Some(armed), "{button}");
        }
    }

    #[test]
    fn test_face_captured_ignored_after_switch() {
        let mut d = Dialogue::default();
        d.on_text(ADD_FACE);
        let armed = d.on_photo().expect("armed");
        d.on_text(RECOGNIZE);
        assert!(!d.face_captured(armed, pending()));
        assert_eq!(armed_action(&d), Some(PhotoAction::Recognize));
    }

    #[test]
    fn test_face_captured_ignored_after_same_button_again() {
        let mut d = Dialogue::default();
        d.on_text(ADD_FACE);
        let first = d.on_photo().expect("armed");
        d.on_text(ADD_FACE);
        assert!(!d.face_captured(first, pending()));

        let second = d.on_photo().expect("re-armed");
        assert_ne!(first, second);
        assert!(d.face_captured(second, pending()));
    }

    #[test]
    fn test_menu_button_drops_pending_name() {
        let mut d = Dialogue::default();
        d.on_text(ADD_FACE);
        let armed = d.on_photo().expect("armed");
        d.face_captured(armed, pending());
        d.on_text(LOOKALIKE);
        assert_eq!(armed_action(&d), Some(PhotoAction::Lookalike));
    }

    #[test]
    fn test_clear_faces_drops_pending_name_only() {
        let mut d = Dialogue::default();
        d.on_text(ADD_FACE);
        let armed = d.on_photo().expect("armed");
        d.face_captured(armed, pending());
        assert!(matches!(d.on_text(CLEAR_FACES), TextReply::ClearFaces));
        assert!(matches!(d.state(), State::Idle));

        d.on_text(VISUALIZE);
        assert!(matches!(d.on_text(CLEAR_FACES), TextReply::ClearFaces));
        assert_eq!(armed_action(&d), Some(PhotoAction::Visualize));
    }

    #[test]
    fn test_list_faces_keeps_state() {
        let mut d = Dialogue::default();
        d.on_text(RECOGNIZE);
        assert!(matches!(d.on_text(LIST_FACES), TextReply::ListFaces));
        assert_eq!(armed_action(&d), Some(PhotoAction::Recognize));
    }

    #[test]
    fn test_complete_returns_to_idle() {
        let mut d = Dialogue::default();
        d.on_text(RECOGNIZE);
        let recognize = d.on_photo().expect("armed");
        d.on_text(LOOKALIKE);
        d.complete(recognize);
        assert_eq!(armed_action(&d), Some(PhotoAction::Lookalike));

        let lookalike = d.on_photo().expect("armed");
        d.complete(lookalike);
        assert!(matches!(d.state(), State::Idle));
    }

    #[test]
    fn test_complete_keeps_same_button_pressed_again() {
        let mut d = Dialogue::default();
        d.on_text(RECOGNIZE);
        let first = d.on_photo().expect("armed");
        d.on_text(RECOGNIZE);
        d.complete(first);
        assert_eq!(armed_action(&d), Some(PhotoAction::Recognize));

        let second = d.on_photo().expect("still armed");
        d.complete(second);
        assert!(matches!(d.state(), State::Idle));
    }

    #[test]
    fn test_unknown_text_is_invalid_option() {
        let mut d = Dialogue::default();
        assert!(matches!(d.on_text("hello"), TextReply::Menu(INVALID_OPTION)));
        d.on_text(RECOGNIZE);
        assert!(matches!(d.on_text("hello"), TextReply::Menu(INVALID_OPTION)));
        assert_eq!(armed_action(&d), Some(PhotoAction::Recognize));
    }
}
