use crate::model::*;

// ── Free-window arithmetic ────────────────────────────────────────

/// Free windows inside `query` once every `booked` window is removed.
/// `booked` need not be sorted or disjoint.
pub fn free_windows(query: &Window, booked: &[Window]) -> Vec<Window> {
    let mut taken: Vec<Window> = booked
        .iter()
        .filter(|w| w.overlaps(query))
        .map(|w| Window::new(w.start.max(query.start), w.end.min(query.end)))
        .collect();
    taken.sort_by_key(|w| w.start);
    let taken = merge_overlapping(&taken);
    subtract_intervals(&[*query], &taken)
}

/// Merge sorted overlapping/adjacent windows into disjoint windows.
pub fn merge_overlapping(sorted: &[Window]) -> Vec<Window> {
    let mut merged: Vec<Window> = Vec::new();
    for &w in sorted {
        if let Some(last) = merged.last_mut()
            && w.start <= last.end
        {
            last.end = last.end.max(w.end);
            continue;
        }
        merged.push(w);
    }
    merged
}

/// Remove sorted, disjoint `to_remove` windows from sorted, disjoint `base`.
pub fn subtract_intervals(base: &[Window], to_remove: &[Window]) -> Vec<Window> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Window::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Window::new(current_start, current_end));
        }
    }

    result
}
