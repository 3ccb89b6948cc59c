//! One-shot toasts carried across a redirect in a cookie.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::presentation::views::ToastView;

pub const FLASH_COOKIE: &str = "kubinet_flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flash {
    PostCreated,
    PostUpdated,
    PostDeleted,
    PageSaved,
    SignInRequired,
}

impl Flash {
    const ALL: [Flash; 5] = [
        Flash::PostCreated,
        Flash::PostUpdated,
        Flash::PostDeleted,
        Flash::PageSaved,
        Flash::SignInRequired,
    ];

    fn code(self) -> &'static str {
        match self {
            Flash::PostCreated => "post-created",
            Flash::PostUpdated => "post-updated",
            Flash::PostDeleted => "post-deleted",
            Flash::PageSaved => "page-saved",
            Flash::SignInRequired => "sign-in-required",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|flash| flash.code() == code)
    }

    pub fn toast(self) -> ToastView {
        match self {
            Flash::PostCreated => ToastView::success("Gönderi başarıyla oluşturuldu"),
            Flash::PostUpdated => ToastView::success("Gönderi başarıyla güncellendi"),
            Flash::PostDeleted => ToastView::success("Gönderi başarıyla silindi"),
            Flash::PageSaved => ToastView::success("İçerik kaydedildi"),
            Flash::SignInRequired => {
                ToastView::error("Bu sayfaya erişmek için oturum açmanız gerekiyor")
            }
        }
    }
}

pub fn set(jar: CookieJar, flash: Flash) -> CookieJar {
    jar.add(
        Cookie::build((FLASH_COOKIE, flash.code()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

/// Read and clear the pending flash. The jar is returned untouched when there is none.
pub fn take(jar: CookieJar) -> (CookieJar, Option<ToastView>) {
    let Some(code) = jar.get(FLASH_COOKIE).map(|cookie| cookie.value().to_string()) else {
        return (jar, None);
    };
    let jar = jar.remove(Cookie::build(FLASH_COOKIE).path("/"));
    (jar, Flash::from_code(&code).map(Flash::toast))
}

pub fn is_pending(jar: &CookieJar) -> bool {
    jar.get(FLASH_COOKIE).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_is_read_once() {
        let jar = set(CookieJar::new(), Flash::PostDeleted);
        assert!(is_pending(&jar));

        let (jar, toast) = take(jar);
        assert_eq!(toast, Some(ToastView::success("Gönderi başarıyla silindi")));
        assert!(!is_pending(&jar));
    }

    #[test]
    fn unknown_code_yields_no_toast() {
        let jar = CookieJar::new().add(Cookie::new(FLASH_COOKIE, "bogus"));
        let (_, toast) = take(jar);
        assert!(toast.is_none());
    }
}
