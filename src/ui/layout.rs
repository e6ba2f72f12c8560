use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Terminals narrower than this hide the side panel.
pub const SIDE_PANEL_MIN_WIDTH: u16 = 90;
const SIDE_PANEL_WIDTH: u16 = 36;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChatLayout {
    pub header: Rect,
    pub transcript: Rect,
    pub side_panel: Option<Rect>,
    pub banner: Option<Rect>,
    pub notices: Rect,
    pub input: Rect,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayoutRequest {
    pub input_rows: u16,
    pub banner_rows: u16,
    pub notice_rows: u16,
}

pub fn split_chat_layout(area: Rect, request: LayoutRequest) -> ChatLayout {
    let banner_rows = request.banner_rows;
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(banner_rows),
            Constraint::Length(request.notice_rows),
            Constraint::Length(request.input_rows.max(1)),
        ])
        .split(area);

    let (transcript, side_panel) = if area.width >= SIDE_PANEL_MIN_WIDTH {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(1), Constraint::Length(SIDE_PANEL_WIDTH)])
            .split(rows[1]);
        (columns[0], Some(columns[1]))
    } else {
        (rows[1], None)
    };

    ChatLayout {
        header: rows[0],
        transcript,
        side_panel,
        banner: (banner_rows > 0).then_some(rows[2]),
        notices: rows[3],
        input: rows[4],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_stacks_rows_top_to_bottom() {
        let area = Rect::new(0, 0, 80, 24);
        let layout = split_chat_layout(
            area,
            LayoutRequest {
                input_rows: 2,
                banner_rows: 3,
                notice_rows: 2,
            },
        );

        assert_eq!(layout.header.height, 1);
        assert_eq!(layout.transcript.height, 16);
        assert_eq!(layout.banner.map(|r| r.y), Some(17));
        assert_eq!(layout.notices.y, 20);
        assert_eq!(layout.input.y, 22);
        assert!(layout.side_panel.is_none(), "80 columns is too narrow");
    }

    #[test]
    fn wide_terminal_gets_side_panel_and_no_banner_when_unused() {
        let area = Rect::new(0, 0, 120, 30);
        let layout = split_chat_layout(
            area,
            LayoutRequest {
                input_rows: 1,
                ..LayoutRequest::default()
            },
        );

        let side = layout.side_panel.expect("side panel");
        assert_eq!(side.width, SIDE_PANEL_WIDTH);
        assert_eq!(layout.transcript.width, 120 - SIDE_PANEL_WIDTH);
        assert!(layout.banner.is_none());
        assert_eq!(layout.input.height, 1);
    }
}
