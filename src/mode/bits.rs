//! Named POSIX permission bits
//!
//! Every mode value inside the crate is a [`ModeBits`]; raw `u32` modes only
//! appear where we talk to the kernel or to SQLite.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// The 12-bit POSIX permission field (no file type bits)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModeBits: u32 {
        const SETUID = 0o4000;
        const SETGID = 0o2000;
        const STICKY = 0o1000;

        const USER_READ = 0o0400;
        const USER_WRITE = 0o0200;
        const USER_EXEC = 0o0100;

        const GROUP_READ = 0o0040;
        const GROUP_WRITE = 0o0020;
        const GROUP_EXEC = 0o0010;

        const OTHER_READ = 0o0004;
        const OTHER_WRITE = 0o0002;
        const OTHER_EXEC = 0o0001;
    }
}

/// Read/write/execute triple for one permission class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rwx {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

/// One of the three permission classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Class {
    User,
    Group,
    Other,
}

impl Class {
    /// All classes in u, g, o order
    pub const ALL: [Class; 3] = [Class::User, Class::Group, Class::Other];

    pub fn read(self) -> ModeBits {
        match self {
            Class::User => ModeBits::USER_READ,
            Class::Group => ModeBits::GROUP_READ,
            Class::Other => ModeBits::OTHER_READ,
        }
    }

    pub fn write(self) -> ModeBits {
        match self {
            Class::User => ModeBits::USER_WRITE,
            Class::Group => ModeBits::GROUP_WRITE,
            Class::Other => ModeBits::OTHER_WRITE,
        }
    }

    pub fn execute(self) -> ModeBits {
        match self {
            Class::User => ModeBits::USER_EXEC,
            Class::Group => ModeBits::GROUP_EXEC,
            Class::Other => ModeBits::OTHER_EXEC,
        }
    }
}

impl ModeBits {
    /// Build from a raw `st_mode`, dropping file type bits
    pub fn from_mode(mode: u32) -> Self {
        Self::from_bits_truncate(mode & 0o7777)
    }

    /// Read the r/w/x bits of one class
    pub fn class_bits(self, class: Class) -> Rwx {
        Rwx {
            read: self.contains(class.read()),
            write: self.contains(class.write()),
            execute: self.contains(class.execute()),
        }
    }

    /// Overwrite the r/w/x bits of one class, clearing what `rwx` leaves off
    pub fn set_class_bits(&mut self, class: Class, rwx: Rwx) {
        self.set(class.read(), rwx.read);
        self.set(class.write(), rwx.write);
        self.set(class.execute(), rwx.execute);
    }

    /// `ls -l` style rendering, e.g. `rwsr-x--T`
    pub fn symbolic(self) -> String {
        let mut out = String::with_capacity(9);
        for class in Class::ALL {
            let rwx = self.class_bits(class);
            out.push(if rwx.read { 'r' } else { '-' });
            out.push(if rwx.write { 'w' } else { '-' });

            let special = match class {
                Class::User => self.contains(ModeBits::SETUID),
                Class::Group => self.contains(ModeBits::SETGID),
                Class::Other => self.contains(ModeBits::STICKY),
            };
            let (set, unset) = match class {
                Class::Other => ('t', 'T'),
                _ => ('s', 'S'),
            };
            out.push(match (rwx.execute, special) {
                (true, true) => set,
                (false, true) => unset,
                (true, false) => 'x',
                (false, false) => '-',
            });
        }
        out
    }
}

impl fmt::Display for ModeBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.bits())
    }
}
